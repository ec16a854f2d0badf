//! REST routes for the provenance registry.

use axum::routing::{get, post};
use axum::Router;

use crate::api::handlers::{
    check_ownership, get_proof, list_owner_proofs, reconcile, register_proof, verify_transaction,
};
use crate::server::AppState;

/// Build the `/api` router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/ownership/check", post(check_ownership))
        .route("/v1/proofs", post(register_proof))
        .route("/v1/proofs/reconcile", post(reconcile))
        .route("/v1/proofs/:fingerprint", get(get_proof))
        .route("/v1/owners/:owner_id/proofs", get(list_owner_proofs))
        .route(
            "/v1/ledger/transactions/:transaction_id/verify",
            get(verify_transaction),
        )
}
