use std::net::SocketAddr;

use hyper::{Body, Request, StatusCode};

use gantry::context::HttpContext;
use gantry::redirector::{Redirector, RedirectorConfig};
use gantry::registry::Handler;
use gantry::trace::Tracer;

fn config(pattern: &str, part: &str, replacement: &str, status: u16) -> RedirectorConfig {
    RedirectorConfig {
        pattern: pattern.to_string(),
        match_part: part.to_string(),
        replacement: replacement.to_string(),
        status_code: status,
    }
}

fn remote() -> SocketAddr {
    "127.0.0.1:50000".parse().unwrap()
}

async fn redirect(config: &RedirectorConfig, url: &str) -> (StatusCode, String, String) {
    let redirector = Redirector::new(config).unwrap();

    let request = Request::builder()
        .method("GET")
        .uri(url)
        .body(Body::empty())
        .unwrap();
    let mut ctx = HttpContext::new(request, remote(), Tracer::noop().new_span("test"));

    redirector.handle(&mut ctx).await;

    let status = ctx.status_code();
    let location = ctx
        .response_headers()
        .get("location")
        .map(|v| v.to_str().unwrap().to_string())
        .unwrap_or_default();

    let body = hyper::body::to_bytes(ctx.into_response().into_body())
        .await
        .unwrap();
    (status, location, String::from_utf8(body.to_vec()).unwrap())
}

struct Case {
    config: RedirectorConfig,
    url: &'static str,
    expected_location: &'static str,
    expected_status: u16,
    expected_body: &'static str,
}

#[tokio::test]
async fn test_match_parts_and_status_codes() {
    let cases = [
        // Defaults: empty part and zero status fall back to uri / 301.
        Case {
            config: config("(.*)", "", "$1", 0),
            url: "http://a.com:8080/foo/bar?baz=qux",
            expected_location: "/foo/bar?baz=qux",
            expected_status: 301,
            expected_body: "Moved Permanently",
        },
        Case {
            config: config("(.*)", "uri", "$1", 301),
            url: "http://a.com:8080/foo/bar?baz=qux",
            expected_location: "/foo/bar?baz=qux",
            expected_status: 301,
            expected_body: "Moved Permanently",
        },
        Case {
            config: config("(.*)", "full", "$1", 302),
            url: "http://a.com:8080/foo/bar?baz=qux",
            expected_location: "http://a.com:8080/foo/bar?baz=qux",
            expected_status: 302,
            expected_body: "Found",
        },
        Case {
            config: config("(.*)", "path", "$1", 303),
            url: "http://a.com:8080/foo/bar?baz=qux",
            expected_location: "/foo/bar",
            expected_status: 303,
            expected_body: "See Other",
        },
        Case {
            config: config("(.*)", "path", "$1", 304),
            url: "http://a.com:8080/foo/bar?baz=qux",
            expected_location: "/foo/bar",
            expected_status: 304,
            expected_body: "Not Modified",
        },
        Case {
            config: config("(.*)", "path", "$1", 307),
            url: "http://a.com:8080/foo/bar?baz=qux",
            expected_location: "/foo/bar",
            expected_status: 307,
            expected_body: "Temporary Redirect",
        },
        Case {
            config: config("(.*)", "path", "$1", 308),
            url: "http://a.com:8080/foo/bar?baz=qux",
            expected_location: "/foo/bar",
            expected_status: 308,
            expected_body: "Permanent Redirect",
        },
    ];

    for (i, case) in cases.iter().enumerate() {
        let (status, location, body) = redirect(&case.config, case.url).await;
        assert_eq!(location, case.expected_location, "case {} location", i);
        assert_eq!(status.as_u16(), case.expected_status, "case {} status", i);
        assert_eq!(body, case.expected_body, "case {} body", i);
    }
}

#[tokio::test]
async fn test_capture_group_substitution() {
    let spec = config("^/users/([0-9]+)", "path", "display?user=$1", 301);

    for (url, expected) in [
        ("http://a.com:8080/users/123", "display?user=123"),
        ("http://a.com:8080/users/9", "display?user=9"),
        ("http://a.com:8080/users/34", "display?user=34"),
        // No match: the original subject passes through unchanged.
        ("http://a.com:8080/users/a123", "/users/a123"),
        ("http://a.com:8080/profile/users/a123", "/profile/users/a123"),
    ] {
        let (status, location, body) = redirect(&spec, url).await;
        assert_eq!(location, expected, "url {}", url);
        assert_eq!(status.as_u16(), 301);
        assert_eq!(body, "Moved Permanently");
    }
}

#[tokio::test]
async fn test_multi_group_substitution() {
    let spec = config(
        "^/users/([0-9]+)/status/([a-z0-9]+)",
        "path",
        "display?user=$1&status=$2",
        301,
    );

    for (url, expected) in [
        (
            "http://a.com:8080/users/123/status/info",
            "display?user=123&status=info",
        ),
        (
            "http://a.com:8080/users/9/status/work",
            "display?user=9&status=work",
        ),
    ] {
        let (_, location, _) = redirect(&spec, url).await;
        assert_eq!(location, expected, "url {}", url);
    }
}

#[tokio::test]
async fn test_absolute_replacement_target() {
    let spec = config(
        "^/users/([0-9]+)",
        "path",
        "http://example.com/display?user=$1",
        301,
    );
    let (_, location, _) = redirect(&spec, "http://a.com:8080/users/123").await;
    assert_eq!(location, "http://example.com/display?user=123");
}

#[tokio::test]
async fn test_uri_prefix_redirect() {
    let spec = config("^(.*)$", "uri", "/prefix$1", 301);
    let (_, location, _) = redirect(
        &spec,
        "https://example.com/path/to/api/?key1=123&key2=456",
    )
    .await;
    assert_eq!(location, "/prefix/path/to/api/?key1=123&key2=456");
}

#[tokio::test]
async fn test_full_url_rewrites() {
    // Prefix insertion keeping scheme and host.
    let spec = config(r"(^.*\/\/)([^\/]*)(.*)$", "full", "${1}${2}/prefix$3", 301);
    let (_, location, _) = redirect(
        &spec,
        "https://example.com/path/to/api/?key1=123&key2=456",
    )
    .await;
    assert_eq!(
        location,
        "https://example.com/prefix/path/to/api/?key1=123&key2=456"
    );

    // Domain replacement keeping scheme and the rest of the URL.
    let spec = config(r"(^.*\/\/)([^\/]*)(.*$)", "full", "${1}my.com${3}", 301);
    let (_, location, _) = redirect(
        &spec,
        "https://example.com/path/to/api/?key1=123&key2=456",
    )
    .await;
    assert_eq!(location, "https://my.com/path/to/api/?key1=123&key2=456");
}

#[tokio::test]
async fn test_query_string_capture() {
    let spec = config(r"/path/to/(user)\.php\?id=(\d*)", "uri", "/api/$1/$2", 301);
    let (_, location, _) = redirect(&spec, "https://example.com/path/to/user.php?id=123").await;
    assert_eq!(location, "/api/user/123");

    let spec = config(
        r"(^.*\/\/)([^\/]*)/path/to/(user)\.php\?id=(\d*)",
        "full",
        "${1}${2}/api/$3/$4",
        301,
    );
    let (_, location, _) = redirect(&spec, "https://example.com/path/to/user.php?id=123").await;
    assert_eq!(location, "https://example.com/api/user/123");
}
