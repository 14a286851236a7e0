pub mod channel_tests;
pub mod room_tests;

use std::sync::Arc;

use fanout_server::{AllowAll, Authorizer, SfuConfig, SignalingService};

use crate::utils::MockEngine;

pub fn create_test_service() -> (SignalingService, Arc<MockEngine>) {
    create_test_service_with(Arc::new(AllowAll))
}

pub fn create_test_service_with(authorizer: Arc<dyn Authorizer>) -> (SignalingService, Arc<MockEngine>) {
    let engine = MockEngine::new();
    let service = SignalingService::new(engine.clone(), authorizer, SfuConfig::default());
    (service, engine)
}
