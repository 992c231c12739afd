//! HTTP API DTOs

use serde::{Deserialize, Serialize};

/// `GET /api/health` のレスポンス
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthDto {
    pub status: String,
    /// 現在のライブ接続数
    pub connections: usize,
}
