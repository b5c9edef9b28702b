//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and test
//! the full crawl cycle end-to-end, with on-disk storage.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use sumi_crawl::config::Config;
use sumi_crawl::crawler::{Coordinator, FetchResult, Fetcher};
use sumi_crawl::{FailureReason, UrlStatus};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

/// Creates a fast test configuration storing into `dir`
fn create_test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.politeness.user_agent = "TestBot/1.0 (+https://example.com/bot)".to_string();
    config.crawler.max_depth = 2;
    config.crawler.max_pages = 100;
    config.crawler.max_concurrent_requests = 4;
    config.crawler.request_delay = 10;
    config.crawler.request_timeout = 5;
    config.crawler.poll_interval = 10;
    config.crawler.shutdown_grace_period = 10;
    config.output.storage_dir = dir.path().to_path_buf();
    config
}

fn html(body: impl Into<String>) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.into().into_bytes(), "text/html; charset=utf-8")
}

async fn mount_page(server: &MockServer, route: &str, body: impl Into<String>) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(html(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_duplicate_links_are_enqueued_once() {
    let server = MockServer::start().await;
    let base = server.uri();

    // 10 links, only 2 distinct
    let links: String = (0..10)
        .map(|i| {
            let target = if i % 2 == 0 { "/one" } else { "/two" };
            format!(r#"<a href="{}{}">link {}</a>"#, base, target, i)
        })
        .collect();
    mount_page(&server, "/", format!("<html><body>{}</body></html>", links)).await;
    mount_page(&server, "/one", "<html><title>One</title></html>").await;
    mount_page(&server, "/two", "<html><title>Two</title></html>").await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&dir);
    config.crawler.max_depth = 1;
    config.crawler.max_pages = 5;

    let coordinator = Coordinator::new(config, true).expect("Failed to create coordinator");
    let stats = coordinator.crawl(&[format!("{}/", base)]).await;

    assert_eq!(stats.urls_discovered, 2);
    assert!(stats.pages_attempted <= 3);
    assert_eq!(stats.pages_attempted, 3);

    let frontier = coordinator.frontier().stats();
    assert!(coordinator.frontier().is_empty());
    assert_eq!(
        (frontier.succeeded + frontier.failed) as u64,
        stats.pages_attempted
    );
    assert_eq!(frontier.total_seen, 3);
}

#[tokio::test]
async fn test_missing_robots_txt_allows_everything() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    mount_page(
        &server,
        "/",
        r#"<html><body><a href="/a">A</a><a href="/private/b">B</a></body></html>"#,
    )
    .await;
    mount_page(&server, "/a", "<html><title>A</title></html>").await;
    mount_page(&server, "/private/b", "<html><title>B</title></html>").await;

    let dir = TempDir::new().unwrap();
    let coordinator = Coordinator::new(create_test_config(&dir), true).unwrap();
    let stats = coordinator.crawl(&[format!("{}/", base)]).await;

    assert_eq!(stats.pages_crawled, 3);
    assert_eq!(stats.robots_denied, 0);
    assert_eq!(coordinator.snapshot().robots.fetches, 1);
}

#[tokio::test]
async fn test_robots_txt_respect() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /admin"))
        .mount(&server)
        .await;
    mount_page(
        &server,
        "/",
        format!(
            r#"<html><head><title>Home</title></head><body>
            <a href="{0}/allowed">Allowed Page</a>
            <a href="{0}/admin">Admin Page</a>
            </body></html>"#,
            base
        ),
    )
    .await;
    mount_page(&server, "/allowed", "<html><title>Allowed</title></html>").await;
    Mock::given(method("GET"))
        .and(path("/admin"))
        .respond_with(html("<html><title>Admin</title></html>"))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let coordinator = Coordinator::new(create_test_config(&dir), true).unwrap();
    let stats = coordinator.crawl(&[format!("{}/", base)]).await;

    assert_eq!(stats.pages_crawled, 2);
    assert_eq!(stats.robots_denied, 1);

    let admin = format!("{}/admin", base);
    assert_eq!(
        coordinator.frontier().status_of(&admin),
        Some(UrlStatus::Failed)
    );
    assert!(coordinator.store().get(&admin).unwrap().is_none());
}

#[tokio::test]
async fn test_unsupported_content_type_is_filtered() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(
        &server,
        "/",
        r#"<html><body><a href="/report">Report</a></body></html>"#,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/report"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"%PDF-1.4".to_vec(), "application/pdf"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let coordinator = Coordinator::new(create_test_config(&dir), true).unwrap();
    let stats = coordinator.crawl(&[format!("{}/", base)]).await;

    assert_eq!(stats.pages_attempted, 2);
    assert_eq!(stats.pages_stored, 1);
    assert_eq!(stats.filtered, 1);
    assert!(coordinator
        .store()
        .get(&format!("{}/report", base))
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_not_found_and_redirect_fail_without_following() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(
        &server,
        "/",
        r#"<html><body><a href="/gone">Gone</a><a href="/moved">Moved</a><a href="/notes">Notes</a></body></html>"#,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404).set_body_raw(b"<html></html>".to_vec(), "text/html"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/moved"))
        .respond_with(
            ResponseTemplate::new(301)
                .insert_header("location", "/elsewhere")
                .insert_header("content-type", "text/html"),
        )
        .mount(&server)
        .await;
    // A non-HTML error page is filtered rather than counted as an error
    Mock::given(method("GET"))
        .and(path("/notes"))
        .respond_with(ResponseTemplate::new(404).set_body_raw(b"gone".to_vec(), "text/plain"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/elsewhere"))
        .respond_with(html("<html></html>"))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let coordinator = Coordinator::new(create_test_config(&dir), true).unwrap();
    let stats = coordinator.crawl(&[format!("{}/", base)]).await;

    assert_eq!(stats.pages_attempted, 4);
    assert_eq!(stats.pages_crawled, 1);
    assert_eq!(stats.errors, 2);
    assert_eq!(stats.filtered, 1);
    assert_eq!(
        coordinator.frontier().status_of(&format!("{}/moved", base)),
        Some(UrlStatus::Failed)
    );
}

#[tokio::test]
async fn test_depth_bound() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(&server, "/", r#"<html><body><a href="/d1">1</a></body></html>"#).await;
    mount_page(&server, "/d1", r#"<html><body><a href="/d2">2</a></body></html>"#).await;
    Mock::given(method("GET"))
        .and(path("/d2"))
        .respond_with(html("<html></html>"))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&dir);
    config.crawler.max_depth = 1;
    let coordinator = Coordinator::new(config, true).unwrap();
    let stats = coordinator.crawl(&[format!("{}/", base)]).await;

    assert_eq!(stats.pages_crawled, 2);
    assert_eq!(
        coordinator.frontier().status_of(&format!("{}/d2", base)),
        None
    );

    let d1 = coordinator
        .store()
        .get(&format!("{}/d1", base))
        .unwrap()
        .unwrap();
    assert_eq!(d1.depth, 1);
    assert_eq!(d1.parent_url, Some(format!("{}/", base)));
}

#[tokio::test]
async fn test_identical_content_is_stored_once() {
    let server = MockServer::start().await;
    let base = server.uri();

    let body = "<html><head><title>Mirror</title></head><body>Same words</body></html>";
    mount_page(
        &server,
        "/",
        r#"<html><body><a href="/a">A</a><a href="/b">B</a></body></html>"#,
    )
    .await;
    mount_page(&server, "/a", body).await;
    mount_page(&server, "/b", body).await;

    let dir = TempDir::new().unwrap();
    let coordinator = Coordinator::new(create_test_config(&dir), true).unwrap();
    let stats = coordinator.crawl(&[format!("{}/", base)]).await;
    assert_eq!(stats.pages_stored, 3);

    let store = coordinator.store();
    let a = store.get(&format!("{}/a", base)).unwrap().unwrap();
    let b = store.get(&format!("{}/b", base)).unwrap().unwrap();
    assert_eq!(a.content_hash, b.content_hash);
    assert_eq!(a.content_ref, b.content_ref);
    assert!(a.is_duplicate != b.is_duplicate);
    assert_eq!(store.read_content(&a).unwrap(), body);

    let storage = store.stats().unwrap();
    assert_eq!(storage.total_pages, 3);
    assert_eq!(storage.duplicate_count, 1);
    assert_eq!(store.session_duplicates(), 1);
}

#[tokio::test]
async fn test_politeness_delay_spaces_same_domain_requests() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(
        &server,
        "/",
        r#"<html><body><a href="/a">A</a><a href="/b">B</a></body></html>"#,
    )
    .await;
    mount_page(&server, "/a", "<html></html>").await;
    mount_page(&server, "/b", "<html></html>").await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&dir);
    config.crawler.request_delay = 200;
    let coordinator = Coordinator::new(config, true).unwrap();
    let stats = coordinator.crawl(&[format!("{}/", base)]).await;

    assert_eq!(stats.pages_crawled, 3);
    // Three fetches to one domain need at least two full delays
    assert!(stats.runtime >= Duration::from_millis(400));
}

#[tokio::test]
async fn test_robots_crawl_delay_spaces_first_requests() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("User-agent: *\nCrawl-delay: 1")
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    let hits = Arc::new(Mutex::new(Vec::new()));
    for route in ["/p1", "/p2"] {
        let hits = Arc::clone(&hits);
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(move |_: &Request| {
                hits.lock().unwrap().push(Instant::now());
                html("<html></html>")
            })
            .mount(&server)
            .await;
    }

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&dir);
    config.crawler.request_delay = 100;
    let coordinator = Coordinator::new(config, true).unwrap();
    let stats = coordinator
        .crawl(&[format!("{}/p1", base), format!("{}/p2", base)])
        .await;

    assert_eq!(stats.pages_crawled, 2);
    let mut hits = hits.lock().unwrap().clone();
    hits.sort();
    assert_eq!(hits.len(), 2);
    // The second page waits out the crawl delay, not just the request delay
    assert!(hits[1] - hits[0] >= Duration::from_millis(900));
}

#[tokio::test]
async fn test_resume_picks_up_pending_urls() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(
        &server,
        "/",
        r#"<html><body><a href="/a">A</a><a href="/b">B</a></body></html>"#,
    )
    .await;
    mount_page(&server, "/a", "<html><title>A</title></html>").await;
    mount_page(&server, "/b", "<html><title>B</title></html>").await;

    let dir = TempDir::new().unwrap();
    let seed = format!("{}/", base);

    let mut config = create_test_config(&dir);
    config.crawler.max_pages = 1;
    {
        let first = Coordinator::new(config.clone(), true).unwrap();
        let stats = first.crawl(&[seed.clone()]).await;
        assert_eq!(stats.pages_attempted, 1);
        assert_eq!(first.frontier().len(), 2);
    }

    config.crawler.max_pages = 100;
    let second = Coordinator::new(config, false).unwrap();
    assert_eq!(second.frontier().len(), 2);
    assert_eq!(
        second.frontier().status_of(&seed),
        Some(UrlStatus::Success)
    );

    // The seed is already known, so only the two pending pages are crawled
    let stats = second.crawl(&[seed]).await;
    assert_eq!(stats.pages_attempted, 2);
    assert_eq!(stats.pages_crawled, 2);
    assert!(second.frontier().is_empty());
    assert_eq!(second.store().stats().unwrap().total_pages, 3);
}

#[tokio::test]
async fn test_fresh_start_discards_saved_frontier() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_page(
        &server,
        "/",
        r#"<html><body><a href="/a">A</a></body></html>"#,
    )
    .await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&dir);
    config.crawler.max_pages = 1;
    {
        let first = Coordinator::new(config.clone(), true).unwrap();
        first.crawl(&[format!("{}/", base)]).await;
    }

    let second = Coordinator::new(config, true).unwrap();
    assert!(second.frontier().is_empty());
    assert_eq!(second.frontier().stats().total_seen, 0);
}

/// Serves `/robots.txt` as 404 and every other path as a chunked HTML body
/// of `body_len` bytes with no Content-Length
async fn spawn_chunked_server(body_len: usize) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }

                if request.starts_with(b"GET /robots.txt") {
                    let _ = socket
                        .write_all(
                            b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                        )
                        .await;
                    return;
                }

                let head = "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n";
                if socket.write_all(head.as_bytes()).await.is_err() {
                    return;
                }
                let chunk = vec![b'a'; 256];
                let mut sent = 0;
                while sent < body_len {
                    let frame = format!("{:x}\r\n", chunk.len());
                    let mut out = frame.into_bytes();
                    out.extend_from_slice(&chunk);
                    out.extend_from_slice(b"\r\n");
                    if socket.write_all(&out).await.is_err() {
                        return;
                    }
                    sent += chunk.len();
                }
                let _ = socket.write_all(b"0\r\n\r\n").await;
            });
        }
    });

    format!("http://{}", addr)
}

#[tokio::test]
async fn test_streamed_oversize_body_is_aborted() {
    let base = spawn_chunked_server(8 * 1024).await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&dir);
    config.fetch.max_file_size = 1024;

    let fetcher = Fetcher::new(&config).unwrap();
    let result = fetcher.fetch(&format!("{}/big", base), 0, None).await;
    assert!(matches!(
        result,
        FetchResult::Failed(FailureReason::OversizedContent { limit: 1024, .. })
    ));

    let coordinator = Coordinator::new(config, true).unwrap();
    let seed = format!("{}/big", base);
    let stats = coordinator.crawl(&[seed.clone()]).await;

    assert_eq!(stats.pages_attempted, 1);
    assert_eq!(stats.pages_stored, 0);
    assert_eq!(stats.errors, 1);
    assert!(coordinator.store().get(&seed).unwrap().is_none());
    assert_eq!(coordinator.store().stats().unwrap().total_pages, 0);
}

#[tokio::test]
async fn test_two_domains_crawl_in_parallel() {
    let first = MockServer::start().await;
    let second = MockServer::start().await;

    mount_page(
        &first,
        "/",
        format!(r#"<html><body><a href="{}/">other</a></body></html>"#, second.uri()),
    )
    .await;
    mount_page(&second, "/", "<html><title>Second</title></html>").await;

    let dir = TempDir::new().unwrap();
    let coordinator = Coordinator::new(create_test_config(&dir), true).unwrap();
    let stats = coordinator.crawl(&[format!("{}/", first.uri())]).await;

    assert_eq!(stats.pages_crawled, 2);
    let storage = coordinator.store().stats().unwrap();
    assert_eq!(storage.per_domain_counts.len(), 2);
}

#[tokio::test]
async fn test_stop_from_another_task() {
    let server = MockServer::start().await;
    let links: String = (0..30)
        .map(|i| format!(r#"<a href="/p{}">p</a>"#, i))
        .collect();
    Mock::given(method("GET"))
        .respond_with(
            html(format!("<html><body>{}</body></html>", links))
                .set_delay(Duration::from_millis(20)),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&dir);
    config.crawler.request_delay = 100;
    let coordinator = Coordinator::new(config, true).unwrap();

    let runner = Arc::clone(&coordinator);
    let seed = format!("{}/", server.uri());
    let handle = tokio::spawn(async move { runner.crawl(&[seed]).await });

    tokio::time::sleep(Duration::from_millis(250)).await;
    coordinator.stop().await;

    let stats = tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("crawl did not stop")
        .unwrap();
    assert!(stats.pages_attempted < 31);
    assert!(!coordinator.frontier().is_empty());
}
