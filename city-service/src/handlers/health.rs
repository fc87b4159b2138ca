/// Liveness probe. Does not touch the document store.
pub async fn health_check() -> &'static str {
    "OK"
}
