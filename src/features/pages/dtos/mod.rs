use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::core::config::MapConfig;
use crate::features::analysis::dtos::AnalysisResponseDto;
use crate::features::analysis::models::StatusCounts;
use crate::features::audit::models::AuditLog;

/// Liveness answer of `/ping`
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PingDto {
    pub status: String,
}

/// Initial map viewport
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct MapDefaultsDto {
    pub lat: f64,
    pub lng: f64,
    pub zoom: u8,
}

impl From<MapConfig> for MapDefaultsDto {
    fn from(map: MapConfig) -> Self {
        Self {
            lat: map.default_lat,
            lng: map.default_lng,
            zoom: map.default_zoom,
        }
    }
}

/// Everything the dashboard shows for one user
#[derive(Debug, Serialize, ToSchema)]
pub struct DashboardDto {
    /// Newest first
    pub analyses: Vec<AnalysisResponseDto>,
    pub counts: StatusCounts,
    pub total: i64,
    pub recent_activity: Vec<AuditLog>,
    pub map: MapDefaultsDto,
}
