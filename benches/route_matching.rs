use criterion::{criterion_group, criterion_main, Criterion};
use http::Method;
use std::hint::black_box;
use zealrouter::dispatcher::{handler, Reply};
use zealrouter::router::{namespaced, RouteOptions, RoutePattern, RouteTarget, Router};

fn inline() -> RouteTarget {
    RouteTarget::Inline(handler(|_| Ok(Reply::html(""))))
}

fn demo_table() -> Router {
    let mut router = Router::new();
    let templates = [
        "/",
        "/home",
        "/quiz/{page}",
        "/quiz/{page}/{tab}",
        "/quiz/{page}/{tab}/{id}",
        "/hello/{name}",
        "/global/{name}",
        "/user/{id}/post/{postId}",
        "/zoo/{category}/animals/{id}/habitats/{habitat_id}/sections/{section_id}",
        "/complex/{a}/{b}/{c}/{d}/{e}/{f}/{g}/{h}/{i}",
    ];
    for tmpl in templates {
        router
            .register(
                RoutePattern::template(tmpl).unwrap(),
                RouteOptions::new().methods(["GET", "POST"]),
                inline(),
            )
            .unwrap();
    }
    router
        .register(
            RoutePattern::catch_all(&namespaced("api", "{module}/{rest}")).unwrap(),
            RouteOptions::new(),
            inline(),
        )
        .unwrap();
    router
        .register(
            RoutePattern::raw("/raw/(?P<rest>.*)").unwrap(),
            RouteOptions::new(),
            inline(),
        )
        .unwrap();
    router
}

fn bench_route_matching(c: &mut Criterion) {
    let router = demo_table();
    let paths = [
        (Method::GET, "/"),
        (Method::GET, "/quiz/intro/2/9"),
        (Method::POST, "/user/7/post/42"),
        (Method::GET, "/zoo/cats/animals/123/habitats/88/sections/5"),
        (Method::GET, "/complex/1/2/3/4/5/6/7/8/9"),
        (Method::GET, "/api/users/list/active"),
        (Method::GET, "/raw/a/b/c"),
    ];
    c.bench_function("route_match", |b| {
        b.iter(|| {
            for (method, path) in &paths {
                black_box(router.route(method, path));
            }
        })
    });

    // Worst case: every route is tried and none matches.
    c.bench_function("route_miss", |b| {
        b.iter(|| black_box(router.route(&Method::GET, "/does/not/exist/at/all")))
    });
}

criterion_group!(benches, bench_route_matching);
criterion_main!(benches);
