use crate::engine::{ChildStats, Diagnostic};
use crate::reload::message::HmrBody;

/// Latest compilation statistics of one platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub name: String,
    pub time: u64,
    pub hash: String,
    pub warnings: Vec<Diagnostic>,
    pub errors: Vec<Diagnostic>,
}

impl From<&ChildStats> for StatsSnapshot {
    fn from(stats: &ChildStats) -> Self {
        Self {
            name: stats.name.clone(),
            time: stats.time,
            hash: stats.hash.clone(),
            warnings: stats.warnings.clone(),
            errors: stats.errors.clone(),
        }
    }
}

impl From<&StatsSnapshot> for HmrBody {
    fn from(snapshot: &StatsSnapshot) -> Self {
        Self {
            name: snapshot.name.clone(),
            time: snapshot.time,
            hash: snapshot.hash.clone(),
            warnings: snapshot.warnings.clone(),
            errors: snapshot.errors.clone(),
        }
    }
}
