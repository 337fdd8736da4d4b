//! Proxy server implementation
//! Routes requests by Host header and relays them to backends on the forward address

use crate::config::ProxyConfig;
use crate::error::{RelayError, ResponseDeliveryError};
use crate::routing::{redirect_location, should_redirect, Protocol};
use crate::rules::Rule;
use crate::tls;
use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use futures_util::FutureExt;
use http_body_util::{combinators::BoxBody, BodyExt, Empty, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderMap, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, HOST, LOCATION};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode, Version};
use hyper_util::rt::TokioIo;
use std::any::Any;
use std::convert::Infallible;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

type ProxyBody = BoxBody<Bytes, hyper::Error>;

/// Proxy server
pub struct ProxyServer {
    config: ProxyConfig,
}

impl ProxyServer {
    /// Create a new proxy server
    pub fn new(config: ProxyConfig) -> Self {
        Self { config }
    }

    /// Bind the listeners the rule table needs, report them and serve until one fails
    pub async fn run(self: Arc<Self>) -> Result<()> {
        // TLS material is checked before any socket is bound
        let acceptor = if self.config.serves_https() {
            let material = self
                .config
                .tls
                .as_ref()
                .ok_or_else(|| anyhow!("HTTPS rules require a certificate and key"))?;
            Some(tls::build_acceptor(material)?)
        } else {
            None
        };

        let http = if self.config.serves_http() {
            Some(self.bind(self.config.http_port).await?)
        } else {
            None
        };

        let https = match acceptor {
            Some(acceptor) => Some((self.bind(self.config.https_port).await?, acceptor)),
            None => None,
        };

        for line in self.config.startup_lines() {
            info!("{}", line);
        }

        let http_server = {
            let server = self.clone();
            async move {
                match http {
                    Some(listener) => server.run_http_server(listener).await,
                    None => Ok(()),
                }
            }
        };
        let https_server = {
            let server = self.clone();
            async move {
                match https {
                    Some((listener, acceptor)) => server.run_https_server(listener, acceptor).await,
                    None => Ok(()),
                }
            }
        };

        tokio::try_join!(http_server, https_server)?;
        Ok(())
    }

    async fn bind(&self, port: u16) -> Result<TcpListener> {
        let address = self.config.listen_address.as_str();
        TcpListener::bind((address, port))
            .await
            .with_context(|| format!("Failed to listen on {}:{}", address, port))
    }

    /// Run HTTP server
    async fn run_http_server(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        loop {
            let (stream, remote_addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Failed to accept HTTP connection: {}", e);
                    continue;
                }
            };
            debug!("HTTP connection from {}", remote_addr);

            tokio::spawn(self.clone().serve_connection(stream, Protocol::Http));
        }
    }

    /// Run HTTPS server, terminating TLS before handing the stream to hyper
    async fn run_https_server(self: Arc<Self>, listener: TcpListener, acceptor: TlsAcceptor) -> Result<()> {
        loop {
            let (stream, remote_addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Failed to accept HTTPS connection: {}", e);
                    continue;
                }
            };
            let acceptor = acceptor.clone();
            let server = self.clone();

            tokio::spawn(async move {
                match acceptor.accept(stream).await {
                    Ok(tls_stream) => server.serve_connection(tls_stream, Protocol::Https).await,
                    Err(e) => warn!("TLS handshake failed with {}: {}", remote_addr, e),
                }
            });
        }
    }

    /// Serve every request on a single connection
    async fn serve_connection<S>(self: Arc<Self>, stream: S, protocol: Protocol)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let io = TokioIo::new(stream);

        let result = http1::Builder::new()
            .preserve_header_case(true)
            .title_case_headers(false)
            .serve_connection(
                io,
                service_fn(move |req| {
                    let server = self.clone();
                    async move { server.handle_request(req, protocol).await }
                }),
            )
            .await;

        if let Err(e) = result {
            // The client is gone, so there is nobody left to answer.
            let _: ResponseDeliveryError = e.into();
        }
    }

    /// Handle a request, turning any failure into a 500 error page
    async fn handle_request(
        self: Arc<Self>,
        req: Request<Incoming>,
        protocol: Protocol,
    ) -> Result<Response<ProxyBody>, Infallible> {
        Ok(Self::respond_or_error(self.process_request(req, protocol)).await)
    }

    /// Await `handling`; an error or a panic becomes a 500 page with its message
    async fn respond_or_error<F>(handling: F) -> Response<ProxyBody>
    where
        F: Future<Output = Result<Response<ProxyBody>, RelayError>>,
    {
        let outcome = AssertUnwindSafe(handling).catch_unwind().await;

        let message = match outcome {
            Ok(Ok(response)) => return response,
            Ok(Err(e)) => {
                let message = e.fault_message();
                warn!("Request error: {}", message);
                message
            }
            Err(panic) => {
                error!("Request handler panicked");
                panic_message(panic.as_ref())
            }
        };

        Self::error_response(StatusCode::INTERNAL_SERVER_ERROR, &message)
    }

    /// Process request
    async fn process_request(
        &self,
        req: Request<Incoming>,
        protocol: Protocol,
    ) -> Result<Response<ProxyBody>, RelayError> {
        let (parts, body) = req.into_parts();
        let body = Self::read_body(&parts.headers, body).await?;

        let host = parts
            .headers
            .get(HOST)
            .map(|h| String::from_utf8_lossy(h.as_bytes()).into_owned());

        let rule = self
            .config
            .rules
            .resolve(protocol, host.as_deref())
            .ok_or(RelayError::NoRule(protocol))?;

        debug!(
            "{} {} {} (host {:?}) -> rule {}",
            protocol, parts.method, parts.uri, host, rule.host
        );

        if should_redirect(protocol, rule) {
            let path = parts.uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
            let location = redirect_location(rule, self.config.https_port, path);
            return Self::redirect_response(&location);
        }

        self.forward(rule, Request::from_parts(parts, body)).await
    }

    /// Read the whole request body, but only when a Content-Length is announced
    async fn read_body(headers: &HeaderMap, body: Incoming) -> Result<Option<Bytes>, RelayError> {
        if !headers.contains_key(CONTENT_LENGTH) {
            return Ok(None);
        }

        let collected = body.collect().await.map_err(RelayError::RequestBody)?;
        Ok(Some(collected.to_bytes()))
    }

    /// Build the backend request: same method, path, query and headers, Host set to the rule's host
    fn build_backend_request(
        req: Request<Option<Bytes>>,
        rule: &Rule,
    ) -> Result<Request<Full<Bytes>>, RelayError> {
        let (parts, body) = req.into_parts();
        let path = parts.uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

        let mut builder = Request::builder()
            .method(parts.method)
            .uri(path)
            .version(Version::HTTP_11);

        // Copy headers
        for (key, value) in parts.headers.iter() {
            if key != HOST {
                builder = builder.header(key, value);
            }
        }
        builder = builder.header(HOST, rule.host.as_str());

        Ok(builder.body(Full::new(body.unwrap_or_default()))?)
    }

    /// Proxy the request to the rule's backend and buffer the whole response
    async fn forward(
        &self,
        rule: &Rule,
        req: Request<Option<Bytes>>,
    ) -> Result<Response<ProxyBody>, RelayError> {
        let proxy_req = Self::build_backend_request(req, rule)?;

        let forward_address = self.config.forward_address.as_str();
        let stream = TcpStream::connect((forward_address, rule.backend_port))
            .await
            .map_err(|source| RelayError::Connect {
                addr: format!("{}:{}", forward_address, rule.backend_port),
                source,
            })?;

        let io = TokioIo::new(stream);

        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(RelayError::Handshake)?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!("Backend connection error: {}", e);
            }
        });

        let response = sender.send_request(proxy_req).await.map_err(RelayError::Send)?;

        // Convert response
        let (parts, body) = response.into_parts();
        let body_bytes = body
            .collect()
            .await
            .map_err(RelayError::ResponseBody)?
            .to_bytes();

        let mut builder = Response::builder().status(parts.status);

        for (key, value) in parts.headers.iter() {
            builder = builder.header(key, value);
        }

        Ok(builder.body(Self::full_body(body_bytes))?)
    }

    /// Create error response
    fn error_response(status: StatusCode, message: &str) -> Response<ProxyBody> {
        let mut response = Response::new(Self::full_body(Bytes::from(error_html(status, message))));
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));
        response
    }

    /// Create redirect response
    fn redirect_response(location: &str) -> Result<Response<ProxyBody>, RelayError> {
        Ok(Response::builder()
            .status(StatusCode::MOVED_PERMANENTLY)
            .header(LOCATION, location)
            .body(Self::empty_body())?)
    }

    /// Create full body
    fn full_body(bytes: Bytes) -> ProxyBody {
        Full::new(bytes)
            .map_err(|never| match never {})
            .boxed()
    }

    /// Create empty body
    fn empty_body() -> ProxyBody {
        Empty::<Bytes>::new()
            .map_err(|never| match never {})
            .boxed()
    }
}

/// HTML error page
///
/// `message` is inserted as is, without escaping.
pub fn error_html(status: StatusCode, message: &str) -> String {
    let title = format!(
        "{} {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or_default()
    );
    format!(
        "<html><head><title>{title}</title></head><body><center><h1>{title}</h1><p>{message}</p></center><br><hr><center><p>{}/{}</p></center></body></html>",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
    )
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "internal error".to_string()
    }
}
