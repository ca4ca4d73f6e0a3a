// Metro
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Deployment policies.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Scope of the instances a handler hands out to clients.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifestylePolicy {
    /// A new instance per request.
    #[default]
    Transient,
    /// One instance per requesting thread.
    Thread,
    /// One shared instance.
    Singleton,
}

/// How strongly a handler retains the instances it creates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionPolicy {
    /// Defer to the runtime: hard at the top level, soft below it.
    #[default]
    System,
    Hard,
    Soft,
    Weak,
}

/// When a component is brought to its initialized state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationPolicy {
    /// Defer to the enclosing container.
    #[default]
    System,
    /// Initialize during container startup.
    Startup,
    /// Initialize on first use.
    Demand,
}

impl fmt::Display for LifestylePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Thread => write!(f, "thread"),
            Self::Singleton => write!(f, "singleton"),
        }
    }
}

impl fmt::Display for CollectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::Hard => write!(f, "hard"),
            Self::Soft => write!(f, "soft"),
            Self::Weak => write!(f, "weak"),
        }
    }
}

impl fmt::Display for ActivationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::Startup => write!(f, "startup"),
            Self::Demand => write!(f, "demand"),
        }
    }
}
