//! Attendance wire types
//!
//! Field names and casing are owned by the HR portal backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Check-in direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Entrada,
    Salida,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Entrada => "entrada",
            Direction::Salida => "salida",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One attendance record as the backend accepts it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceEvent {
    #[serde(rename = "colaboradorID")]
    pub colaborador_id: String,
    pub tipo: Direction,
    /// Stamped when the submission is built, not when the code decoded
    #[serde(rename = "horaRegistro")]
    pub hora_registro: DateTime<Utc>,
}

/// Backend acknowledgement of a recorded check-in
#[derive(Debug, Clone)]
pub struct Ack {
    pub data: Option<serde_json::Value>,
}

/// Most recent recorded check-in for a collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastCheckin {
    pub tipo: Direction,
    #[serde(rename = "horaRegistro")]
    pub hora_registro: DateTime<Utc>,
}
