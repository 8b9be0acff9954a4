#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Route {
    status: u16,
    content_type: &'static str,
    body: Vec<u8>,
    location: Option<String>,
}

impl Route {
    pub fn json(value: serde_json::Value) -> Self {
        Self {
            status: 200,
            content_type: "application/json",
            body: value.to_string().into_bytes(),
            location: None,
        }
    }

    pub fn bytes(content_type: &'static str, body: &[u8]) -> Self {
        Self {
            status: 200,
            content_type,
            body: body.to_vec(),
            location: None,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: format!("status {status}").into_bytes(),
            location: None,
        }
    }

    /// 302 to `location`, which may be relative to the stub.
    pub fn redirect(location: &str) -> Self {
        Self {
            status: 302,
            content_type: "text/plain",
            body: Vec::new(),
            location: Some(location.to_owned()),
        }
    }
}

/// Local HTTP server answering fixed routes (path plus query) and counting hits.
/// Unknown paths get a 404. Shuts down on drop.
pub struct HttpStub {
    pub base_url: String,
    hits: Arc<Mutex<HashMap<String, usize>>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl HttpStub {
    pub fn spawn<I, S>(routes: I) -> Self
    where
        I: IntoIterator<Item = (S, Route)>,
        S: Into<String>,
    {
        let routes = routes
            .into_iter()
            .map(|(path, route)| (path.into(), route))
            .collect::<HashMap<String, Route>>();

        let server = tiny_http::Server::http("127.0.0.1:0").expect("start http stub server");
        let base_url = format!("http://{}", server.server_addr());
        let hits = Arc::new(Mutex::new(HashMap::<String, usize>::new()));
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let thread_hits = Arc::clone(&hits);
        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let path = request.url().to_string();
                *thread_hits
                    .lock()
                    .expect("hits lock")
                    .entry(path.clone())
                    .or_default() += 1;

                let route = routes.get(&path).cloned().unwrap_or_else(|| Route::status(404));
                let mut response =
                    tiny_http::Response::from_data(route.body).with_status_code(route.status);
                response.add_header(
                    tiny_http::Header::from_bytes(&b"Content-Type"[..], route.content_type.as_bytes())
                        .expect("content-type header"),
                );
                if let Some(location) = route.location {
                    response.add_header(
                        tiny_http::Header::from_bytes(&b"Location"[..], location.as_bytes())
                            .expect("location header"),
                    );
                }
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            hits,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// `127.0.0.1:<port>`
    pub fn authority(&self) -> &str {
        self.base_url.trim_start_matches("http://")
    }

    pub fn hits(&self, path: &str) -> usize {
        self.hits
            .lock()
            .expect("hits lock")
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_hits(&self) -> usize {
        self.hits.lock().expect("hits lock").values().sum()
    }
}

impl Drop for HttpStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
