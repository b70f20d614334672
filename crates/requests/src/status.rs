use core::str::FromStr;

use serde::{Deserialize, Serialize};

use kardex_core::DomainError;

/// Request lifecycle state.
///
/// ```text
/// Pendiente ──► Observada ──► Pendiente
///     │            │
///     ├──► Aprobada ◄┤ ──► Entregada (terminal)
///     └──► Rechazada ◄┘    (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pendiente,
    Observada,
    Aprobada,
    Entregada,
    Rechazada,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 5] = [
        RequestStatus::Pendiente,
        RequestStatus::Observada,
        RequestStatus::Aprobada,
        RequestStatus::Entregada,
        RequestStatus::Rechazada,
    ];

    /// The transition table. Every lifecycle rule about *where* a request may go
    /// next lives here and nowhere else.
    pub fn allowed_targets(self) -> &'static [RequestStatus] {
        use RequestStatus::*;
        match self {
            Pendiente => &[Observada, Aprobada, Rechazada],
            Observada => &[Pendiente, Aprobada, Rechazada],
            Aprobada => &[Entregada],
            Entregada => &[],
            Rechazada => &[],
        }
    }

    pub fn can_transition_to(self, target: RequestStatus) -> bool {
        self.allowed_targets().contains(&target)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_targets().is_empty()
    }

    /// Business fields may only be edited while the request is under observation.
    pub fn permits_update(self) -> bool {
        self == RequestStatus::Observada
    }

    pub fn permits_exception_toggle(self) -> bool {
        self == RequestStatus::Observada
    }

    pub fn permits_line_addition(self) -> bool {
        matches!(self, RequestStatus::Observada | RequestStatus::Aprobada)
    }

    /// Delivered requests are legal evidence and are retained.
    pub fn permits_removal(self) -> bool {
        self != RequestStatus::Entregada
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pendiente => "pendiente",
            RequestStatus::Observada => "observada",
            RequestStatus::Aprobada => "aprobada",
            RequestStatus::Entregada => "entregada",
            RequestStatus::Rechazada => "rechazada",
        }
    }
}

impl core::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RequestStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DomainError::validation(format!("unknown request status '{s}'")))
    }
}
