//! The `Rider` entity and its lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::location::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Outbound,
    Inbound,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Outbound => Direction::Inbound,
            Direction::Inbound => Direction::Outbound,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiderState {
    Waiting,
    Boarded,
    Completed,
    Expired,
    Rejected,
}

/// Where the rider lives in the reservoirs — a closed sum type rather than a
/// stringly-keyed dictionary, so the reservoir that owns a rider is always
/// statically known at the call site that dispatches it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RiderHome {
    Depot { depot_id: String },
    Route { grid_cell: (i64, i64), route_id: String, direction: Direction },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rider {
    pub id: Uuid,
    pub origin: Location,
    pub destination: Location,
    pub route_id: String,
    pub direction: Direction,
    pub state: RiderState,
    pub spawned_at: DateTime<Utc>,
    pub boarded_at: Option<DateTime<Utc>>,
    pub alighted_at: Option<DateTime<Utc>>,
    pub vehicle_id: Option<String>,
    pub max_walking_distance_m: f64,
    pub max_wait_time_secs: u64,
    pub priority: f64,
    pub home: RiderHome,
}

impl Rider {
    pub fn new(
        origin: Location,
        destination: Location,
        route_id: String,
        direction: Direction,
        home: RiderHome,
        spawned_at: DateTime<Utc>,
        max_walking_distance_m: f64,
        max_wait_time_secs: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            origin,
            destination,
            route_id,
            direction,
            state: RiderState::Waiting,
            spawned_at,
            boarded_at: None,
            alighted_at: None,
            vehicle_id: None,
            max_walking_distance_m,
            max_wait_time_secs,
            priority: 0.5,
            home,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.state == RiderState::Waiting
            && (now - self.spawned_at).num_seconds() >= self.max_wait_time_secs as i64
    }

    /// `WAITING -> BOARDED`. Returns an error for any other source state —
    /// transitions are monotonic, never silently re-applied from an
    /// unexpected state.
    pub fn board(&mut self, vehicle_id: String, at: DateTime<Utc>) -> crate::error::SimResult<()> {
        if self.state != RiderState::Waiting {
            return Err(crate::error::SimError::state(format!(
                "rider {} cannot board from state {:?}",
                self.id, self.state
            )));
        }
        self.state = RiderState::Boarded;
        self.boarded_at = Some(at);
        self.vehicle_id = Some(vehicle_id);
        Ok(())
    }

    pub fn alight(&mut self, at: DateTime<Utc>) -> crate::error::SimResult<()> {
        if self.state != RiderState::Boarded {
            return Err(crate::error::SimError::state(format!(
                "rider {} cannot alight from state {:?}",
                self.id, self.state
            )));
        }
        self.state = RiderState::Completed;
        self.alighted_at = Some(at);
        Ok(())
    }

    pub fn expire(&mut self) -> crate::error::SimResult<()> {
        if self.state != RiderState::Waiting {
            return Err(crate::error::SimError::state(format!(
                "rider {} cannot expire from state {:?}",
                self.id, self.state
            )));
        }
        self.state = RiderState::Expired;
        Ok(())
    }
}
