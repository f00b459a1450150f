//! Request-shape validation middleware, mounted ahead of the handlers in
//! `api/http.rs`/`api/ws.rs` so a malformed body is rejected before it
//! reaches C5 at all. Schema shapes mirror the bodies those handlers
//! themselves deserialize — kept here too so a bad request gets a
//! `400 invalid_request` from schema validation rather than falling through
//! to serde's less informative rejection.

use actix_web::{
    body::{BoxBody, EitherBody, MessageBody},
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    web, Error, HttpMessage, HttpResponse,
};
use actix_web::http::Method;
use futures_util::future::{ready, LocalBoxFuture, Ready};
use jsonschema::{Draft, JSONSchema};
use serde_json::Value;
use std::sync::Arc;

/// Schemas for the two bodies carrying arbitrary user-controlled JSON:
/// `POST /api/actions/execute` and inbound WS frames (both ultimately
/// become a `shared_types::Request`).
pub struct ValidationSchemas {
    execute_schema: JSONSchema,
    ws_schema: JSONSchema,
}

impl ValidationSchemas {
    pub fn new() -> Self {
        let execute_schema_value = serde_json::json!({
            "type": "object",
            "required": ["type", "content"],
            "properties": {
                "type": { "type": "string", "minLength": 1 },
                "content": { "type": "string", "minLength": 1 },
                "context": { "type": "object" },
                "id": { "type": "string" },
            },
        });
        let execute_schema = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&execute_schema_value)
            .expect("invalid execute-action schema");

        let ws_schema_value = serde_json::json!({
            "type": "object",
            "required": ["id", "kind", "content"],
            "properties": {
                "id": { "type": "string", "minLength": 1 },
                "kind": { "type": "string", "minLength": 1 },
                "content": { "type": "string", "minLength": 1 },
                "context": { "type": "object" },
            },
        });
        let ws_schema = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&ws_schema_value)
            .expect("invalid ws-frame schema");

        Self { execute_schema, ws_schema }
    }

    pub fn validate_execute(&self, value: &Value) -> Result<(), String> {
        self.execute_schema
            .validate(value)
            .map_err(|errors| {
                errors
                    .map(|e| format!("{} at {}", e, e.instance_path))
                    .collect::<Vec<_>>()
                    .join(", ")
            })
    }

    pub fn validate_ws(&self, value: &Value) -> Result<(), String> {
        self.ws_schema
            .validate(value)
            .map_err(|errors| {
                errors
                    .map(|e| format!("{} at {}", e, e.instance_path))
                    .collect::<Vec<_>>()
                    .join(", ")
            })
    }
}

#[derive(Clone)]
pub struct RequestValidationMiddleware {
    schemas: Arc<ValidationSchemas>,
}

impl RequestValidationMiddleware {
    pub fn new() -> Self {
        Self {
            schemas: Arc::new(ValidationSchemas::new()),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequestValidationMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + Clone + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RequestValidationMiddlewareService<S, B>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestValidationMiddlewareService::new(
            service,
            self.schemas.clone(),
        )))
    }
}

#[derive(Clone)]
pub struct RequestValidationMiddlewareService<S, B> {
    service: S,
    schemas: Arc<ValidationSchemas>,
    _phantom: std::marker::PhantomData<B>,
}

impl<S, B> RequestValidationMiddlewareService<S, B> {
    fn new(service: S, schemas: Arc<ValidationSchemas>) -> Self {
        Self {
            service,
            schemas,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<S, B> Service<ServiceRequest> for RequestValidationMiddlewareService<S, B>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + Clone + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &self,
        ctx: &mut core::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let schemas = self.schemas.clone();
        let method = req.method().clone();
        let path = req.path().to_owned();

        if method == Method::POST && path.ends_with("/api/actions/execute") {
            let service = self.service.clone();
            Box::pin(async move {
                match req.extract::<web::Json<Value>>().await {
                    Ok(body) => {
                        if let Err(err) = schemas.validate_execute(&body.into_inner()) {
                            let res: HttpResponse<BoxBody> = HttpResponse::BadRequest().json(
                                serde_json::json!({ "error": "invalid_request", "details": err }),
                            );
                            return Ok(ServiceResponse::new(
                                req.into_parts().0,
                                res.map_into_right_body(),
                            ));
                        }
                    }
                    Err(_) => {
                        let res: HttpResponse<BoxBody> = HttpResponse::BadRequest()
                            .json(serde_json::json!({ "error": "invalid_request" }));
                        return Ok(ServiceResponse::new(
                            req.into_parts().0,
                            res.map_into_right_body(),
                        ));
                    }
                }
                Ok(service.call(req).await?.map_into_left_body())
            })
        } else {
            let fut = self.service.call(req);
            Box::pin(async move { Ok(fut.await?.map_into_left_body()) })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn execute_schema_accepts_minimal_body() {
        let schemas = ValidationSchemas::new();
        let valid = json!({ "type": "chat", "content": "open firefox" });
        assert!(schemas.validate_execute(&valid).is_ok());
    }

    #[test]
    fn execute_schema_rejects_missing_content() {
        let schemas = ValidationSchemas::new();
        let invalid = json!({ "type": "chat" });
        assert!(schemas.validate_execute(&invalid).is_err());
    }

    #[test]
    fn execute_schema_rejects_empty_content() {
        let schemas = ValidationSchemas::new();
        let invalid = json!({ "type": "chat", "content": "" });
        assert!(schemas.validate_execute(&invalid).is_err());
    }

    #[test]
    fn ws_schema_requires_id_kind_content() {
        let schemas = ValidationSchemas::new();
        let valid = json!({ "id": "r1", "kind": "chat", "content": "hello" });
        assert!(schemas.validate_ws(&valid).is_ok());

        let invalid = json!({ "kind": "chat", "content": "hello" });
        assert!(schemas.validate_ws(&invalid).is_err());
    }
}
