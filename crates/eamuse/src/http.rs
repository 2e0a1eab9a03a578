//! HTTP front for the XRPC pipeline.
//!
//! Cabinets POST packets to `/` or to any path below it (some games put the
//! service name in the URL). A GET on the same paths is a healthcheck for
//! humans and load balancers.

use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::post,
    Router,
};
use eamuse_server::transport::{HEADER_COMPRESS, HEADER_EAMUSE_INFO, HEADER_REMOTE_ADDRESS};
use eamuse_server::{XrpcRequest, XrpcResponse, XrpcService};
use std::net::SocketAddr;
use tracing::{trace, warn};

pub const HEALTHCHECK_MESSAGE: &str = "e-Amuse server is up. Point your cabinet here.";

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct HttpState {
    pub service: XrpcService,
    /// When set, browsers are redirected to the web frontend on this port.
    pub frontend_port: Option<u16>,
}

/// Builds the application router.
pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/", post(handle_xrpc).get(healthcheck))
        .route("/*path", post(handle_xrpc).get(healthcheck))
        .with_state(state)
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

/// Runs one packet through the pipeline.
pub async fn handle_xrpc(
    State(state): State<HttpState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = XrpcRequest {
        body: body.to_vec(),
        compression: header_string(&headers, HEADER_COMPRESS),
        encryption: header_string(&headers, HEADER_EAMUSE_INFO),
        remote_address: header_string(&headers, HEADER_REMOTE_ADDRESS),
        peer: Some(peer.ip()),
    };
    trace!("📡 {} bytes from {}", request.body.len(), peer);

    into_http(state.service.handle(request).await)
}

fn into_http(response: XrpcResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let success = response.is_success();
    let mut out = (status, response.body).into_response();

    if !success {
        out.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
    }
    for (name, value) in response.headers {
        match HeaderValue::from_str(&value) {
            Ok(value) => {
                out.headers_mut().insert(name, value);
            }
            Err(_) => warn!("Dropping unrepresentable {} header", name),
        }
    }
    out
}

/// Answers browsers. Redirects to the frontend when one is configured and
/// the request says which host it was addressed to.
pub async fn healthcheck(State(state): State<HttpState>, headers: HeaderMap) -> Response {
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .map(strip_port);

    match (state.frontend_port, host) {
        (Some(port), Some(host)) => Redirect::permanent(&format!("http://{host}:{port}/")).into_response(),
        _ => HEALTHCHECK_MESSAGE.into_response(),
    }
}

fn strip_port(host: &str) -> &str {
    // Bracketed IPv6 literals keep their brackets.
    if let Some(end) = host.find(']') {
        return &host[..=end];
    }
    host.split(':').next().unwrap_or(host)
}

#[cfg(test)]
mod tests {
    use super::*;
    use eamuse_data::Database;
    use eamuse_protocol::{EamuseProtocol, Node};
    use eamuse_server::{GameRegistry, ServerConfig};
    use std::sync::Arc;

    const PCBID: &str = "01201000000000000099";

    /// Helper to create handler state with Sample Mix registered and PASELI on
    fn create_state(frontend_port: Option<u16>) -> (HttpState, EamuseProtocol) {
        let registry = Arc::new(GameRegistry::new());
        game_sample::register(&registry);
        let protocol = EamuseProtocol::default();
        let mut config = ServerConfig::new("127.0.0.1", 8080);
        config.paseli.enabled = true;
        let service = XrpcService::new(protocol.clone(), Database::in_memory().unwrap(), registry, config);
        (
            HttpState {
                service,
                frontend_port,
            },
            protocol,
        )
    }

    fn packet(protocol: &EamuseProtocol, model: &str, info: Option<&str>) -> Bytes {
        let mut alive = Node::void("pcbtracker");
        alive.set_attribute("method", "alive");
        let mut call = Node::void("call");
        call.set_attribute("model", model);
        call.set_attribute("srcid", PCBID);
        call.add_child(alive);
        Bytes::from(protocol.encode(None, info, &call).unwrap())
    }

    fn peer() -> ConnectInfo<SocketAddr> {
        ConnectInfo(SocketAddr::from(([192, 168, 0, 20], 50_123)))
    }

    async fn body_of(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn test_post_round_trip() {
        let (state, protocol) = create_state(None);
        let info = "1-5f3b2a10-8c1d";
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_EAMUSE_INFO, HeaderValue::from_static("1-5f3b2a10-8c1d"));

        let response = handle_xrpc(
            State(state),
            peer(),
            headers,
            packet(&protocol, "SMP:J:A:A:2021060100", Some(info)),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("x-compress").unwrap(), "none");
        assert_eq!(response.headers().get("x-eamuse-info").unwrap(), info);

        let body = body_of(response).await;
        let root = protocol.decode(None, Some(info), &body).unwrap();
        assert_eq!(root.name(), "response");
        assert_eq!(root.children()[0].attribute("ecenable"), Some("1"));
    }

    #[tokio::test]
    async fn test_post_unknown_game_is_not_found() {
        let (state, protocol) = create_state(None);
        let response = handle_xrpc(
            State(state),
            peer(),
            HeaderMap::new(),
            packet(&protocol, "QQQ:J:A:A:2021060100", None),
        )
        .await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_of(response).await, b"No response generated");
    }

    #[tokio::test]
    async fn test_post_garbage_is_bad_request() {
        let (state, _) = create_state(None);
        let response = handle_xrpc(
            State(state),
            peer(),
            HeaderMap::new(),
            Bytes::from_static(b"GET / HTTP/1.1"),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers().get("x-compress").is_none());
    }

    #[tokio::test]
    async fn test_peer_address_reaches_the_database() {
        let (state, protocol) = create_state(None);
        let service = state.service.clone();

        let mut put = Node::void("pcbevent");
        put.set_attribute("method", "put");
        put.add_child(
            Node::void("item")
                .with_child(Node::string("name", "boot"))
                .with_child(Node::s32("value", 1))
                .with_child(Node::u64("time", 1_700_000_000)),
        );
        let mut call = Node::void("call");
        call.set_attribute("model", "SMP:J:A:A:2021060100");
        call.set_attribute("srcid", PCBID);
        call.add_child(put);
        let body = Bytes::from(protocol.encode(None, None, &call).unwrap());

        let response = handle_xrpc(State(state), peer(), HeaderMap::new(), body).await;
        assert_eq!(response.status(), StatusCode::OK);

        let data = service.database().data().unwrap();
        let events = data.network().get_events(Some("pcbevent"), 1).await.unwrap();
        assert_eq!(events[0].data.get_str("ip", ""), "192.168.0.20");
    }

    #[tokio::test]
    async fn test_healthcheck_text() {
        let (state, _) = create_state(None);
        let response = healthcheck(State(state), HeaderMap::new()).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_of(response).await, HEALTHCHECK_MESSAGE.as_bytes());
    }

    #[tokio::test]
    async fn test_healthcheck_redirects_to_frontend() {
        let (state, _) = create_state(Some(3000));
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("eamuse.local:8080"));

        let response = healthcheck(State(state), headers).await;
        assert_eq!(response.status(), StatusCode::PERMANENT_REDIRECT);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "http://eamuse.local:3000/"
        );
    }

    #[test]
    fn test_strip_port() {
        assert_eq!(strip_port("eamuse.local:8080"), "eamuse.local");
        assert_eq!(strip_port("10.0.0.2"), "10.0.0.2");
        assert_eq!(strip_port("[::1]:8080"), "[::1]");
    }
}
