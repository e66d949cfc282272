//! In-process fake routers for tests.
//!
//! [`FakeRouter`] answers the handful of RouterOS API commands the probe
//! sends. [`FakeNetwork`] is a [`TunnelSession`] whose forwards are served
//! by fake routers over in-memory duplex pipes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{duplex, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;

use crate::routeros::{read_sentence, write_sentence};
use crate::transport::Channel;
use crate::tunnel::{TunnelError, TunnelSession, TunnelStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Behavior {
    Normal,
    /// Accepts the connection, never answers.
    Silent,
    /// Answers the first sentence with an invalid length prefix.
    Garbled,
    /// Normal for the first N connections, silent after that.
    StallAfter(usize),
}

#[derive(Debug, Clone)]
pub struct FakeRouter {
    identity: String,
    version: Option<String>,
    model: Option<String>,
    neighbors: Vec<(String, u32)>,
    password: String,
    behavior: Behavior,
    /// Shared by every clone, so it counts connections across forwards.
    connections: Arc<AtomicUsize>,
}

impl FakeRouter {
    pub fn new(identity: &str) -> Self {
        Self {
            identity: identity.to_string(),
            version: None,
            model: None,
            neighbors: Vec::new(),
            password: String::new(),
            behavior: Behavior::Normal,
            connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_resource(mut self, version: &str, model: &str) -> Self {
        self.version = Some(version.to_string());
        self.model = Some(model.to_string());
        self
    }

    pub fn with_neighbor(mut self, ip: &str, cost: u32) -> Self {
        self.neighbors.push((ip.to_string(), cost));
        self
    }

    pub fn with_password(mut self, password: &str) -> Self {
        self.password = password.to_string();
        self
    }

    pub fn silent(mut self) -> Self {
        self.behavior = Behavior::Silent;
        self
    }

    pub fn garbled(mut self) -> Self {
        self.behavior = Behavior::Garbled;
        self
    }

    pub fn stall_after(mut self, connections: usize) -> Self {
        self.behavior = Behavior::StallAfter(connections);
        self
    }

    fn reply(&self, words: &[String]) -> Vec<Vec<String>> {
        let done = vec!["!done".to_string()];
        let row = |attrs: Vec<(&str, String)>| {
            let mut sentence = vec!["!re".to_string()];
            sentence.extend(attrs.into_iter().map(|(k, v)| format!("={k}={v}")));
            sentence
        };

        match words.first().map(String::as_str) {
            Some("/login") => {
                let given = words
                    .iter()
                    .find_map(|w| w.strip_prefix("=password="))
                    .unwrap_or("");
                if given == self.password {
                    vec![done]
                } else {
                    vec![
                        vec![
                            "!trap".to_string(),
                            "=message=invalid user name or password".to_string(),
                        ],
                        done,
                    ]
                }
            }
            Some("/system/identity/print") => {
                vec![row(vec![("name", self.identity.clone())]), done]
            }
            Some("/system/resource/print") => {
                let mut attrs = vec![("uptime", "1d2h".to_string())];
                if let Some(v) = &self.version {
                    attrs.push(("version", v.clone()));
                }
                if let Some(m) = &self.model {
                    attrs.push(("board-name", m.clone()));
                }
                vec![row(attrs), done]
            }
            Some("/routing/ospf/neighbor/print") => {
                let mut sentences: Vec<Vec<String>> = self
                    .neighbors
                    .iter()
                    .map(|(ip, cost)| {
                        row(vec![
                            ("router-id", ip.clone()),
                            ("address", ip.clone()),
                            ("cost", cost.to_string()),
                            ("state", "Full".to_string()),
                            ("interface", "ether1".to_string()),
                        ])
                    })
                    .collect();
                sentences.push(done);
                sentences
            }
            _ => vec![
                vec!["!trap".to_string(), "=message=no such command".to_string()],
                done,
            ],
        }
    }
}

/// Answer API sentences on `stream` until the client goes away.
pub async fn serve<S>(router: FakeRouter, mut stream: S)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let nth = router.connections.fetch_add(1, Ordering::SeqCst);
    let behavior = match router.behavior {
        Behavior::StallAfter(limit) if nth >= limit => Behavior::Silent,
        Behavior::StallAfter(_) => Behavior::Normal,
        other => other,
    };

    match behavior {
        Behavior::Silent => {
            let mut buf = [0u8; 1024];
            while let Ok(n) = stream.read(&mut buf).await {
                if n == 0 {
                    return;
                }
            }
        }
        Behavior::Garbled => {
            if read_sentence(&mut stream).await.is_ok() {
                let _ = stream.write_all(&[0xF8, 0x00]).await;
            }
        }
        Behavior::Normal | Behavior::StallAfter(_) => {
            while let Ok(words) = read_sentence(&mut stream).await {
                for sentence in router.reply(&words) {
                    if write_sentence(&mut stream, &sentence).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

/// Serve `router` on every connection accepted by `listener`.
pub fn serve_tcp(listener: TcpListener, router: FakeRouter) {
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(serve(router.clone(), stream));
        }
    });
}

/// A tunnel whose far side is a set of fake routers keyed by IP.
pub struct FakeNetwork {
    routers: HashMap<String, FakeRouter>,
    connected: AtomicBool,
    forwards: AtomicUsize,
    /// The session drops once this many forwards have been served.
    lose_after: Option<usize>,
    forwarded: Mutex<Vec<String>>,
}

impl FakeNetwork {
    pub fn new() -> Self {
        Self {
            routers: HashMap::new(),
            connected: AtomicBool::new(true),
            forwards: AtomicUsize::new(0),
            lose_after: None,
            forwarded: Mutex::new(Vec::new()),
        }
    }

    pub fn with_router(mut self, ip: &str, router: FakeRouter) -> Self {
        self.routers.insert(ip.to_string(), router);
        self
    }

    pub fn lose_session_after(mut self, forwards: usize) -> Self {
        self.lose_after = Some(forwards);
        self
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Hosts that a forward was requested for, in order.
    pub fn forwarded_hosts(&self) -> Vec<String> {
        self.forwarded
            .lock()
            .map(|hosts| hosts.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl TunnelSession for FakeNetwork {
    async fn connect(&self, _host: &str, _user: &str, _secret: &str) -> Result<(), TunnelError> {
        self.set_connected(true);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TunnelError> {
        self.set_connected(false);
        Ok(())
    }

    async fn status(&self) -> TunnelStatus {
        TunnelStatus {
            connected: self.connected.load(Ordering::SeqCst),
            host: Some("fake-jump".to_string()),
        }
    }

    async fn forward(&self, host: &str, port: u16) -> Result<Channel, TunnelError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TunnelError::NotConnected);
        }
        if let Ok(mut hosts) = self.forwarded.lock() {
            hosts.push(host.to_string());
        }

        let served = self.forwards.fetch_add(1, Ordering::SeqCst);
        if self.lose_after.is_some_and(|limit| served >= limit) {
            self.set_connected(false);
            return Err(TunnelError::SessionLost("master exited".to_string()));
        }

        let Some(router) = self.routers.get(host).cloned() else {
            return Err(TunnelError::ForwardFailed {
                target: format!("{host}:{port}"),
                reason: "connect failed: Connection refused".to_string(),
            });
        };

        let (client, server) = duplex(64 * 1024);
        tokio::spawn(serve(router, server));
        Ok(Box::new(client))
    }
}
