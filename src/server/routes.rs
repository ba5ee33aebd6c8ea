use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tracing::debug;
use tracing::info;
use tracing::warn;
use warp::http::Method;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::ws::Ws;
use warp::Filter;
use warp::Rejection;
use warp::Reply;

use super::DpServerContext;
use crate::auth::PeerInfo;
use crate::negotiation::NegotiationRequest;
use crate::node::SessionStyle;
use crate::session::serve_session;
use crate::session::split_websocket;
use crate::session::HandshakeQuery;

const MAX_NEGOTIATION_BODY: usize = 1024 * 1024;

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    message: &'a str,
}

pub(crate) fn error_reply(
    status: u16,
    message: &str,
) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    warp::reply::with_status(warp::reply::json(&ErrorBody { message }), status).into_response()
}

/// All DP routes for one connection from `peer`
pub fn routes(
    ctx: Arc<DpServerContext>,
    peer: PeerInfo,
) -> impl Filter<Extract = (Response,), Error = Infallible> + Clone {
    let outlet = warp::path!("v1" / "outlet").and(session_route(ctx.clone(), peer.clone(), SessionStyle::Legacy));
    let wrpc = warp::path!("v1" / "wrpc").and(session_route(ctx.clone(), peer.clone(), SessionStyle::Rpc));

    let negotiate = warp::path!("version-handshake")
        .and(with_context(ctx, peer))
        .and(warp::method())
        .and(warp::body::bytes())
        .and_then(negotiate_handler);

    outlet
        .or(wrpc)
        .unify()
        .or(negotiate)
        .unify()
        .recover(handle_rejection)
        .unify()
}

fn with_context(
    ctx: Arc<DpServerContext>,
    peer: PeerInfo,
) -> impl Filter<Extract = (Arc<DpServerContext>, PeerInfo), Error = Infallible> + Clone {
    warp::any().map(move || (ctx.clone(), peer.clone())).untuple_one()
}

fn session_route(
    ctx: Arc<DpServerContext>,
    peer: PeerInfo,
    style: SessionStyle,
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::get()
        .and(with_context(ctx, peer))
        .and(warp::any().map(move || style))
        .and(warp::query::<HandshakeQuery>())
        .and(warp::ws())
        .and_then(session_handler)
}

async fn session_handler(
    ctx: Arc<DpServerContext>,
    peer: PeerInfo,
    style: SessionStyle,
    query: HandshakeQuery,
    ws: Ws,
) -> Result<Response, Rejection> {
    if let Err(e) = ctx.authenticator.authenticate(&peer) {
        warn!(addr = %peer.remote_addr, "data plane authentication failed: {}", e.message);
        return Ok(error_reply(e.http_status, &e.message));
    }

    let handshake = match query.validate(&ctx.version_floor) {
        Ok(handshake) => handshake,
        Err(e) => {
            warn!(addr = %peer.remote_addr, "rejecting data plane handshake: {}", e);
            return Ok(error_reply(400, &e.to_string()));
        }
    };

    info!(
        node_id = %handshake.node_id,
        hostname = %handshake.hostname,
        version = %handshake.raw_version,
        ?style,
        "data plane connecting"
    );

    let manager = ctx.manager.clone();
    let remote_addr = peer.remote_addr;
    Ok(ws
        .on_upgrade(move |socket| async move {
            let (sink, source) = split_websocket(socket);
            serve_session(manager, handshake, remote_addr, style, sink, source).await;
        })
        .into_response())
}

async fn negotiate_handler(
    ctx: Arc<DpServerContext>,
    peer: PeerInfo,
    method: Method,
    body: Bytes,
) -> Result<Response, Rejection> {
    if method != Method::POST {
        return Ok(error_reply(405, "method not allowed"));
    }

    if let Err(e) = ctx.authenticator.authenticate(&peer) {
        return Ok(error_reply(e.http_status, &e.message));
    }

    if body.len() > MAX_NEGOTIATION_BODY {
        return Ok(error_reply(413, "negotiation request too large"));
    }

    let request: NegotiationRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            debug!("unparseable negotiation request: {}", e);
            return Ok(error_reply(400, &format!("invalid negotiation request: {e}")));
        }
    };

    match ctx.negotiator.negotiate(&request) {
        Ok(response) => Ok(warp::reply::json(&response).into_response()),
        Err(e) => Ok(error_reply(e.http_status(), &e.to_string())),
    }
}

async fn handle_rejection(rejection: Rejection) -> Result<Response, Infallible> {
    let (status, message) = if rejection.is_not_found() {
        (404, "not found".to_string())
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        (405, "method not allowed".to_string())
    } else if let Some(e) = rejection.find::<warp::reject::InvalidQuery>() {
        (400, e.to_string())
    } else if let Some(e) = rejection.find::<warp::reject::MissingHeader>() {
        (400, e.to_string())
    } else if let Some(e) = rejection.find::<warp::reject::InvalidHeader>() {
        (400, e.to_string())
    } else {
        warn!("unhandled rejection: {:?}", rejection);
        (500, "internal server error".to_string())
    };
    Ok(error_reply(status, &message))
}
