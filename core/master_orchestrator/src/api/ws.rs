//! C6: the session multiplexer, duplex half. One actor per WebSocket
//! connection; each inbound text frame is an independent `Request` that
//! gets its own spawned pipeline run, bounded by an in-flight cap `K`
//! (`ctx.max_inflight_per_connection`) so one slow request never starves
//! the others and a burst never runs the whole plan of a connection at
//! once. Responses are emitted as each pipeline run completes, which is
//! not necessarily the order requests arrived in — `spec.md` §4.6 is
//! explicit that ordering is by completion, not arrival.
//!
//! Grounded in the teacher's own `actix`/`actix-web-actors` actor shape
//! (`Actor` + `StreamHandler<Result<ws::Message, ws::ProtocolError>>`) and
//! in `original_source`'s `websocket.py::ConnectionManager`, whose
//! dead-connection reaping on any send failure is mirrored here by
//! `ctx.stop()` on the first transport error.

use std::collections::VecDeque;
use std::sync::atomic::Ordering;

use actix::{Actor, ActorContext, ActorFutureExt, AsyncContext, StreamHandler, WrapFuture};
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use tracing::{info, warn};

use shared_types::{PipelineResponse, Request};

use super::auth::{verify_auth, Claims};
use super::ApiContext;
use crate::pipeline;

pub fn configure(cfg: &mut web::ServiceConfig, ctx: ApiContext) {
    let ctx_data = web::Data::new(ctx);
    cfg.app_data(ctx_data).route("/ws", web::get().to(ws_entry));
}

/// One live WebSocket connection. `in_flight` and `pending` are plain
/// (non-atomic) fields: actix runs an actor's handlers on a single thread
/// with no interleaving, so nothing here needs its own synchronization —
/// only the connection-count gauge shared across sessions needs `Arc`.
struct WsSession {
    api_ctx: ApiContext,
    #[allow(dead_code)]
    claims: Option<Claims>,
    in_flight: usize,
    pending: VecDeque<Request>,
}

impl WsSession {
    fn new(api_ctx: ApiContext, claims: Option<Claims>) -> Self {
        WsSession {
            api_ctx,
            claims,
            in_flight: 0,
            pending: VecDeque::new(),
        }
    }

    /// Admits `request` into the in-flight window if there's room,
    /// otherwise queues it for when a slot frees up (C6's backpressure).
    fn admit_or_queue(&mut self, request: Request, ctx: &mut ws::WebsocketContext<Self>) {
        if self.in_flight < self.api_ctx.max_inflight_per_connection {
            self.spawn_pipeline(request, ctx);
        } else {
            self.pending.push_back(request);
        }
    }

    fn spawn_pipeline(&mut self, request: Request, ctx: &mut ws::WebsocketContext<Self>) {
        self.in_flight += 1;
        let pipeline_ctx = self.api_ctx.pipeline.clone();
        let deadline = self.api_ctx.request_deadline;

        let fut = async move {
            match tokio::time::timeout(deadline, pipeline::process(&request, &pipeline_ctx)).await
            {
                Ok(response) => response,
                Err(_) => PipelineResponse::error(request.id.clone(), "deadline_exceeded"),
            }
        };

        ctx.spawn(fut.into_actor(self).map(|response, act, ctx| {
            act.in_flight -= 1;
            act.send_response(&response, ctx);
            act.drain_one_pending(ctx);
        }));
    }

    fn drain_one_pending(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        if self.in_flight < self.api_ctx.max_inflight_per_connection {
            if let Some(next) = self.pending.pop_front() {
                self.spawn_pipeline(next, ctx);
            }
        }
    }

    fn send_response(&self, response: &PipelineResponse, ctx: &mut ws::WebsocketContext<Self>) {
        match serde_json::to_string(response) {
            Ok(json) => ctx.text(json),
            Err(e) => {
                warn!(error = %e, "failed to serialize pipeline response, closing connection");
                ctx.stop();
            }
        }
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        self.api_ctx.ws_connections.fetch_add(1, Ordering::Relaxed);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.api_ctx.ws_connections.fetch_sub(1, Ordering::Relaxed);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => {
                let text = text.trim();
                if text.is_empty() {
                    return;
                }

                match serde_json::from_str::<Request>(text) {
                    Ok(request) => self.admit_or_queue(request, ctx),
                    Err(e) => {
                        warn!(error = %e, "dropping malformed ws frame");
                        let error_response = serde_json::json!({
                            "status": "error",
                            "reason": "invalid_request",
                        });
                        ctx.text(error_response.to_string());
                    }
                }
            }
            Ok(ws::Message::Ping(bytes)) => ctx.pong(&bytes),
            Ok(ws::Message::Pong(_)) => {}
            Ok(ws::Message::Binary(_)) => {
                // Binary frames are not part of the duplex protocol.
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {}
            Ok(ws::Message::Nop) => {}
            Err(e) => {
                warn!(error = %e, "ws protocol error, reaping connection");
                ctx.stop();
            }
        }
    }
}

async fn ws_entry(
    req: HttpRequest,
    stream: web::Payload,
    ctx: web::Data<ApiContext>,
) -> Result<HttpResponse, Error> {
    let claims = if let Some(jwt_auth) = &ctx.jwt_auth {
        match verify_auth(&req, jwt_auth).await {
            Ok(claims) => Some(claims),
            Err(e) => return Ok(HttpResponse::Unauthorized().json(e.to_string())),
        }
    } else {
        None
    };

    info!("ws connection established");
    let session = WsSession::new(ctx.get_ref().clone(), claims);
    ws::start(session, &req, stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_the_inflight_cap_before_queueing() {
        // Pure bookkeeping check: verifies the counting logic without
        // standing up a real actor/websocket, since that requires a live
        // HTTP server.
        let cap = 2usize;
        let mut in_flight = 0usize;
        let mut pending: VecDeque<u8> = VecDeque::new();

        for item in [1u8, 2, 3] {
            if in_flight < cap {
                in_flight += 1;
            } else {
                pending.push_back(item);
            }
        }

        assert_eq!(in_flight, 2);
        assert_eq!(pending.len(), 1);
    }
}
