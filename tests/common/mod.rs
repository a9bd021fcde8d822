#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// One canned response.
#[derive(Clone)]
pub struct Route {
    pub body: String,
    pub content_type: &'static str,
    pub delay: Duration,
}

impl Route {
    pub fn html(body: &str) -> Self {
        Self {
            body: body.to_string(),
            content_type: "text/html; charset=utf-8",
            delay: Duration::ZERO,
        }
    }

    pub fn js(body: &str) -> Self {
        Self {
            body: body.to_string(),
            content_type: "application/javascript",
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(mut self, millis: u64) -> Self {
        self.delay = Duration::from_millis(millis);
        self
    }
}

/// A request the server saw: path plus the `Cookie` header, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenRequest {
    pub path: String,
    pub cookie: Option<String>,
}

pub struct TestServer {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<SeenRequest>>>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn cookie_for(&self, path: &str) -> Option<String> {
        self.requests()
            .into_iter()
            .find(|request| request.path == path)
            .and_then(|request| request.cookie)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

/// Serve `routes` on a random local port until the returned server is dropped.
/// Unknown paths get a 404.
pub async fn start_server(routes: Vec<(&str, Route)>) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let routes: Arc<HashMap<String, Route>> = Arc::new(
        routes
            .into_iter()
            .map(|(path, route)| (path.to_string(), route))
            .collect(),
    );
    let requests = Arc::new(Mutex::new(Vec::new()));
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

    let seen = Arc::clone(&requests);
    tokio::spawn(async move {
        loop {
            tokio::select! {
                accept = listener.accept() => {
                    let Ok((mut stream, _)) = accept else { continue };
                    let routes = Arc::clone(&routes);
                    let seen = Arc::clone(&seen);
                    tokio::spawn(async move {
                        let mut buffer = vec![0u8; 8192];
                        let n = match stream.read(&mut buffer).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => n,
                        };
                        let request = String::from_utf8_lossy(&buffer[..n]).to_string();
                        let mut lines = request.lines();
                        let first_line = lines.next().unwrap_or("GET /");
                        let path = first_line.split_whitespace().nth(1).unwrap_or("/").to_string();
                        let cookie = lines
                            .take_while(|line| !line.is_empty())
                            .find_map(|line| {
                                let (name, value) = line.split_once(':')?;
                                name.eq_ignore_ascii_case("cookie")
                                    .then(|| value.trim().to_string())
                            });
                        seen.lock().unwrap().push(SeenRequest {
                            path: path.clone(),
                            cookie,
                        });

                        let (status_line, route) = match routes.get(&path) {
                            Some(route) => ("HTTP/1.1 200 OK\r\n", route.clone()),
                            None => ("HTTP/1.1 404 Not Found\r\n", Route::html("")),
                        };
                        if !route.delay.is_zero() {
                            tokio::time::sleep(route.delay).await;
                        }
                        let header = format!(
                            "{status_line}Content-Length: {}\r\nContent-Type: {}\r\nConnection: close\r\n\r\n",
                            route.body.len(),
                            route.content_type,
                        );
                        let _ = stream.write_all(header.as_bytes()).await;
                        let _ = stream.write_all(route.body.as_bytes()).await;
                        let _ = stream.flush().await;
                    });
                }
                _ = &mut shutdown_rx => break,
            }
        }
    });

    TestServer {
        addr,
        requests,
        shutdown: Some(shutdown_tx),
    }
}

/// Collects `jsdomError` messages and details from a virtual console.
#[derive(Clone, Default)]
pub struct ErrorLog(Arc<Mutex<Vec<(String, Option<String>)>>>);

impl ErrorLog {
    pub fn attach(console: &domenv::VirtualConsole) -> Self {
        let log = Self::default();
        let sink = log.clone();
        console.on_jsdom_error(move |error| {
            sink.0
                .lock()
                .unwrap()
                .push((error.message.clone(), error.detail.clone()));
        });
        log
    }

    pub fn messages(&self) -> Vec<String> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .map(|(message, _)| message.clone())
            .collect()
    }

    pub fn entries(&self) -> Vec<(String, Option<String>)> {
        self.0.lock().unwrap().clone()
    }
}
