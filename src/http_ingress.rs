use std::{convert::Infallible, net::SocketAddr, sync::Arc, sync::mpsc, thread};

use anyhow::{Context, Result};
use http_body_util::{BodyExt, Full};
use hyper::{
    Method, Request, Response, StatusCode,
    body::{Bytes, Incoming},
    header::CONTENT_TYPE,
    server::conn::http1::Builder as Http1Builder,
    service::service_fn,
};
use hyper_util::rt::tokio::TokioIo;
use serde_json::json;
use tokio::{net::TcpListener, runtime::Runtime, sync::oneshot};

use crate::handler::{CommandHandler, InboundCommand};
use crate::relay_log;

#[derive(Clone)]
pub struct RelayServerConfig {
    pub bind_addr: SocketAddr,
    pub route: String,
    pub handler: CommandHandler,
    pub debug: bool,
}

pub struct RelayServer {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<thread::JoinHandle<Result<()>>>,
}

impl RelayServer {
    /// Binds the listener and serves on a dedicated runtime thread.
    ///
    /// Returns once the socket is bound, so `local_addr` is usable even
    /// when the configured port was 0.
    pub fn start(config: RelayServerConfig) -> Result<Self> {
        let state = Arc::new(RelayState {
            route: config.route,
            handler: config.handler,
            debug: config.debug,
        });
        let (tx, rx) = oneshot::channel();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<SocketAddr>>();
        let addr = config.bind_addr;
        let handle = thread::Builder::new()
            .name("relay-ingress".to_string())
            .spawn(move || -> Result<()> {
                let runtime = Runtime::new().context("failed to create ingress runtime")?;
                runtime.block_on(async move {
                    let listener = match TcpListener::bind(addr)
                        .await
                        .with_context(|| format!("failed to bind ingress listener on {addr}"))
                    {
                        Ok(listener) => listener,
                        Err(err) => {
                            let message = format!("{err:#}");
                            let _ = ready_tx.send(Err(err));
                            anyhow::bail!(message);
                        }
                    };
                    let local_addr = listener.local_addr()?;
                    relay_log::info(
                        module_path!(),
                        format!(
                            "newman relay listening on http://{local_addr}{}",
                            state.route
                        ),
                    );
                    let _ = ready_tx.send(Ok(local_addr));
                    let mut shutdown = rx;
                    loop {
                        tokio::select! {
                            _ = &mut shutdown => break,
                            accept = listener.accept() => match accept {
                                Ok((stream, peer)) => {
                                    let connection_state = state.clone();
                                    tokio::spawn(async move {
                                        let service = service_fn(move |req| {
                                            handle_request(req, connection_state.clone())
                                        });
                                        let http = Http1Builder::new();
                                        let stream = TokioIo::new(stream);
                                        if let Err(err) = http
                                            .serve_connection(stream, service)
                                            .await
                                        {
                                            relay_log::error(
                                                module_path!(),
                                                format!(
                                                    "relay connection error peer={peer}: {err}"
                                                ),
                                            );
                                        }
                                    });
                                }
                                Err(err) => {
                                    relay_log::error(
                                        module_path!(),
                                        format!("relay accept error: {err}"),
                                    );
                                }
                            },
                        }
                    }
                    Ok(())
                })
            })?;
        let local_addr = match ready_rx.recv() {
            Ok(Ok(local_addr)) => local_addr,
            Ok(Err(err)) => {
                let _ = handle.join();
                return Err(err);
            }
            Err(_) => {
                let joined = handle
                    .join()
                    .map_err(|err| anyhow::anyhow!("ingress server panicked: {err:?}"))?;
                joined?;
                anyhow::bail!("ingress server exited before binding");
            }
        };
        Ok(Self {
            local_addr,
            shutdown: Some(tx),
            handle: Some(handle),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stop(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let joined = handle
                .join()
                .map_err(|err| anyhow::anyhow!("ingress server panicked: {err:?}"))?;
            joined?;
        }
        Ok(())
    }
}

struct RelayState {
    route: String,
    handler: CommandHandler,
    debug: bool,
}

async fn handle_request(
    req: Request<Incoming>,
    state: Arc<RelayState>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = match handle_request_inner(req, state).await {
        Ok(response) => response,
        Err(response) => response,
    };
    Ok(response)
}

async fn handle_request_inner(
    req: Request<Incoming>,
    state: Arc<RelayState>,
) -> Result<Response<Full<Bytes>>, Response<Full<Bytes>>> {
    if req.uri().path() != state.route {
        return Err(error_response(StatusCode::NOT_FOUND, "unknown route"));
    }
    if req.method() != Method::POST {
        return Err(error_response(
            StatusCode::METHOD_NOT_ALLOWED,
            "only POST allowed",
        ));
    }
    let payload_bytes = req
        .into_body()
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .map_err(|err| {
            error_response(
                StatusCode::BAD_REQUEST,
                format!("failed to read request body: {err}"),
            )
        })?;
    if state.debug {
        relay_log::debug(
            module_path!(),
            format!(
                "command request path={} payload_len={}",
                state.route,
                payload_bytes.len()
            ),
        );
    }
    // Acknowledged either way; without a response_url nothing can be notified.
    match parse_command(&payload_bytes) {
        Some(command) => state.handler.dispatch(command).detach(),
        None => relay_log::warn(
            module_path!(),
            format!(
                "dropping command without response_url payload_len={}",
                payload_bytes.len()
            ),
        ),
    }
    Ok(accepted_response())
}

/// Reads a slash-command form body. `text` may be absent; `response_url` may not.
pub fn parse_command(body: &[u8]) -> Option<InboundCommand> {
    let mut callback_url = None;
    let mut raw_text = None;
    for (key, value) in form_urlencoded::parse(body) {
        match key.as_ref() {
            "response_url" => callback_url = Some(value.into_owned()),
            "text" => raw_text = Some(value.into_owned()),
            _ => {}
        }
    }
    let callback_url = callback_url.filter(|value| !value.trim().is_empty())?;
    Some(InboundCommand {
        callback_url,
        raw_text: raw_text.unwrap_or_default(),
    })
}

fn accepted_response() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::ACCEPTED;
    response
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response<Full<Bytes>> {
    let body = json!({
        "success": false,
        "message": message.into()
    });
    let body = serde_json::to_string(&body).unwrap_or_else(|_| "{}".to_string());
    let mut response = Response::new(Full::from(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    response
}
