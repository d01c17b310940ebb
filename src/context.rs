//! The acting user and the evaluation context threaded through every stage.

use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::model::UserId;

/// Who is running a query. `id == None` is the anonymous user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Option<UserId>,
    #[serde(default)]
    pub admin: bool,
    #[serde(default = "default_time_zone")]
    pub time_zone: Tz,
}

fn default_time_zone() -> Tz {
    Tz::UTC
}

impl Actor {
    pub fn anonymous() -> Self {
        Self {
            id: None,
            admin: false,
            time_zone: Tz::UTC,
        }
    }

    pub fn user(id: UserId) -> Self {
        Self {
            id: Some(id),
            admin: false,
            time_zone: Tz::UTC,
        }
    }

    pub fn admin(id: UserId) -> Self {
        Self {
            admin: true,
            ..Self::user(id)
        }
    }

    pub fn with_time_zone(mut self, time_zone: Tz) -> Self {
        self.time_zone = time_zone;
        self
    }

    pub fn is_logged(&self) -> bool {
        self.id.is_some()
    }

    /// Value substituted for `"me"`; anonymous users match nobody.
    pub fn me_value(&self) -> String {
        self.id.map_or_else(|| "0".to_string(), |id| id.to_string())
    }
}

/// Inputs fixed for one evaluation: the actor and their "today". The anchor
/// project travels on the query itself.
#[derive(Debug, Clone)]
pub struct EvalContext {
    pub actor: Actor,
    /// The actor's calendar day, computed once.
    pub today: NaiveDate,
}

impl EvalContext {
    /// Context whose "today" is the current day in the actor's time zone.
    pub fn new(actor: Actor) -> Self {
        let today = Utc::now().with_timezone(&actor.time_zone).date_naive();
        Self::at(actor, today)
    }

    /// Context with an explicit "today".
    pub fn at(actor: Actor, today: NaiveDate) -> Self {
        Self { actor, today }
    }
}
