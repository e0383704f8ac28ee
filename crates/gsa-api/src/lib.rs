//! Stateless HTTP front-end of the GSA orchestration service.
//!
//! The API validates requests, admits jobs (status record on the
//! blackboard + work item on the broker), serves status and result
//! queries, exposes the method/type/datasource catalogs and the public
//! dataset search, and runs the stall sweeper.

pub mod admission;
pub mod catalog;
pub mod config;
pub mod error;
pub mod methods;
pub mod routes;
pub mod search;
pub mod sweeper;

use std::sync::Arc;

use gsa_common::blackboard::BlackboardRef;
use gsa_common::broker::BrokerRef;
use gsa_common::registry::JobRegistry;

use catalog::Catalog;
use config::ApiConfig;
use search::SearchIndex;

/// Shared state for all request handlers
#[derive(Clone)]
pub struct ApiState {
    pub board: BlackboardRef,
    pub broker: BrokerRef,
    pub registry: Arc<JobRegistry>,
    pub catalog: Arc<Catalog>,
    pub search: Arc<SearchIndex>,
    pub config: Arc<ApiConfig>,
}
