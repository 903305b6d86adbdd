use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use gts::GtsOps;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::logging::LoggingMiddleware;

/// REST wrapper over `GtsOps`. The store is immutable after load, so the
/// state is a plain `Arc` shared across handlers.
pub struct GtsHttpServer {
    ops: GtsOps,
    host: String,
    port: u16,
    verbose: u8,
}

impl GtsHttpServer {
    #[must_use]
    pub fn new(ops: GtsOps, host: String, port: u16, verbose: u8) -> Self {
        Self {
            ops,
            host,
            port,
            verbose,
        }
    }

    /// Binds and serves until the process is stopped.
    ///
    /// # Errors
    /// Returns an error when the listener cannot bind or serving fails.
    pub async fn run(self) -> anyhow::Result<()> {
        let addr = format!("{}:{}", self.host, self.port);
        let app = Self::router(Arc::new(self.ops), self.verbose);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        tracing::info!("server listening on {}", addr);
        axum::serve(listener, app).await?;
        Ok(())
    }

    #[must_use]
    pub fn router(ops: Arc<GtsOps>, verbose: u8) -> Router {
        let mut router = Router::new()
            .route("/entities", get(list_entities))
            .route("/entities/:gts_id", get(get_entity))
            .route("/validate-id", get(validate_id))
            .route("/parse-id", get(parse_id))
            .route("/match-id-pattern", get(match_id_pattern))
            .route("/uuid", get(id_to_uuid))
            .route("/extract-id", post(extract_id))
            .route("/instances-of", get(instances_of))
            .route("/validate-instance", post(validate_instance))
            .route("/resolve-relationships", get(schema_graph))
            .route("/compatibility", get(compatibility))
            .route("/cast", post(cast))
            .route("/query", get(query))
            .route("/attr", get(attr))
            .route("/diagnostics", get(diagnostics))
            .with_state(ops);

        if verbose >= 1 {
            let logging = LoggingMiddleware::new(verbose);
            router = router.layer(middleware::from_fn(move |req, next| {
                let logging = logging.clone();
                async move { logging.handle(req, next).await }
            }));
        }

        router
    }

    #[must_use]
    pub fn openapi_spec(&self) -> Value {
        json!({
            "openapi": "3.0.0",
            "info": {
                "title": "GTS Server",
                "version": env!("CARGO_PKG_VERSION")
            },
            "servers": [{
                "url": format!("http://{}:{}", self.host, self.port)
            }],
            "paths": {
                "/entities": {"get": {"summary": "List loaded entities"}},
                "/entities/{gts_id}": {"get": {"summary": "Get one entity"}},
                "/validate-id": {"get": {"summary": "Validate a GTS identifier"}},
                "/parse-id": {"get": {"summary": "Parse a GTS identifier"}},
                "/match-id-pattern": {"get": {"summary": "Match an id against a wildcard"}},
                "/uuid": {"get": {"summary": "Derive the deterministic UUID"}},
                "/extract-id": {"post": {"summary": "Extract the GTS id from a document"}},
                "/instances-of": {"get": {"summary": "List instances of a schema"}},
                "/validate-instance": {"post": {"summary": "Validate an instance against its schema"}},
                "/resolve-relationships": {"get": {"summary": "Build the schema reference graph"}},
                "/compatibility": {"get": {"summary": "Minor-version compatibility verdict"}},
                "/cast": {"post": {"summary": "Cast an instance between minor versions"}},
                "/query": {"get": {"summary": "Query entities"}},
                "/attr": {"get": {"summary": "Resolve an attribute path"}},
                "/diagnostics": {"get": {"summary": "Load-time diagnostics"}}
            }
        })
    }
}

#[derive(Deserialize)]
struct GtsIdQuery {
    gts_id: String,
}

#[derive(Deserialize)]
struct MatchIdQuery {
    candidate: String,
    pattern: String,
}

#[derive(Deserialize)]
struct SchemaIdQuery {
    schema_id: String,
}

#[derive(Deserialize)]
struct CompatibilityQuery {
    old_schema_id: String,
    new_schema_id: String,
}

#[derive(Deserialize)]
struct QueryParams {
    expr: String,
    #[serde(default = "default_limit")]
    limit: usize,
}

#[derive(Deserialize)]
struct AttrQuery {
    gts_with_path: String,
}

#[derive(Deserialize)]
struct LimitQuery {
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    100
}

#[derive(Deserialize)]
struct CastRequest {
    instance_id: String,
    to_schema_id: String,
}

#[derive(Deserialize)]
struct ValidateInstanceRequest {
    instance_id: String,
}

async fn list_entities(
    State(ops): State<Arc<GtsOps>>,
    Query(params): Query<LimitQuery>,
) -> impl IntoResponse {
    Json(ops.list_entities(params.limit))
}

async fn get_entity(
    State(ops): State<Arc<GtsOps>>,
    Path(gts_id): Path<String>,
) -> impl IntoResponse {
    Json(ops.get_entity(&gts_id))
}

async fn validate_id(Query(params): Query<GtsIdQuery>) -> impl IntoResponse {
    Json(GtsOps::validate_id(&params.gts_id))
}

async fn parse_id(Query(params): Query<GtsIdQuery>) -> impl IntoResponse {
    Json(GtsOps::parse_id(&params.gts_id))
}

async fn match_id_pattern(Query(params): Query<MatchIdQuery>) -> impl IntoResponse {
    Json(GtsOps::match_id_pattern(&params.candidate, &params.pattern))
}

async fn id_to_uuid(
    State(ops): State<Arc<GtsOps>>,
    Query(params): Query<GtsIdQuery>,
) -> impl IntoResponse {
    Json(ops.uuid(&params.gts_id))
}

async fn extract_id(State(ops): State<Arc<GtsOps>>, Json(body): Json<Value>) -> impl IntoResponse {
    Json(ops.extract_id(&body))
}

async fn instances_of(
    State(ops): State<Arc<GtsOps>>,
    Query(params): Query<SchemaIdQuery>,
) -> impl IntoResponse {
    Json(ops.instances_of(&params.schema_id))
}

async fn validate_instance(
    State(ops): State<Arc<GtsOps>>,
    Json(body): Json<ValidateInstanceRequest>,
) -> impl IntoResponse {
    Json(ops.validate_instance(&body.instance_id))
}

async fn schema_graph(
    State(ops): State<Arc<GtsOps>>,
    Query(params): Query<GtsIdQuery>,
) -> impl IntoResponse {
    Json(ops.schema_graph(&params.gts_id))
}

async fn compatibility(
    State(ops): State<Arc<GtsOps>>,
    Query(params): Query<CompatibilityQuery>,
) -> impl IntoResponse {
    Json(ops.compatibility(&params.old_schema_id, &params.new_schema_id))
}

async fn cast(
    State(ops): State<Arc<GtsOps>>,
    Json(body): Json<CastRequest>,
) -> impl IntoResponse {
    Json(ops.cast(&body.instance_id, &body.to_schema_id))
}

async fn query(
    State(ops): State<Arc<GtsOps>>,
    Query(params): Query<QueryParams>,
) -> impl IntoResponse {
    Json(ops.query(&params.expr, params.limit))
}

async fn attr(
    State(ops): State<Arc<GtsOps>>,
    Query(params): Query<AttrQuery>,
) -> impl IntoResponse {
    Json(ops.attr(&params.gts_with_path))
}

async fn diagnostics(State(ops): State<Arc<GtsOps>>) -> impl IntoResponse {
    Json(ops.diagnostics().clone())
}
