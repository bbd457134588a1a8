//! Shared test utilities for uw-db unit tests.

use uw_core::entities::Deal;
use uw_core::enums::Program;
use uw_core::identity::Caller;

use crate::service::UwService;

/// In-memory service with migrations applied.
pub async fn test_service() -> UwService {
    UwService::new_local(":memory:").await.unwrap()
}

pub fn caller() -> Caller {
    Caller::new("ten-acme", "usr-analyst")
}

pub fn other_tenant() -> Caller {
    Caller::new("ten-globex", "usr-analyst")
}

/// Create a bridge deal in New York for `caller()`.
pub async fn seed_deal(svc: &UwService) -> Deal {
    svc.create_deal(&caller(), "Maple Street Refinance", Program::Bridge, "NY")
        .await
        .unwrap()
}
