use serde::{Deserialize, Serialize};

/// Role a caller (or a message party) acts under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Patient,
    Clinician,
    Location,
    System,
}

impl UserType {
    pub fn as_str(self) -> &'static str {
        match self {
            UserType::Patient => "patient",
            UserType::Clinician => "clinician",
            UserType::Location => "location",
            UserType::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "patient" => Some(UserType::Patient),
            "clinician" => Some(UserType::Clinician),
            "location" => Some(UserType::Location),
            "system" => Some(UserType::System),
            _ => None,
        }
    }
}

impl std::fmt::Display for UserType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authenticated claims, as produced by the embedding request layer after
/// token verification. Only one of the ids is normally populated, except
/// clinicians who additionally assert location ids out of band.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Claims {
    pub patient_id: Option<String>,
    pub clinician_id: Option<String>,
    pub system_id: Option<String>,
}

impl Claims {
    pub fn patient(id: impl Into<String>) -> Self {
        Claims {
            patient_id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn clinician(id: impl Into<String>) -> Self {
        Claims {
            clinician_id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn system(id: impl Into<String>) -> Self {
        Claims {
            system_id: Some(id.into()),
            ..Default::default()
        }
    }
}

/// Per-request identity: verified claims plus the caller-supplied location
/// list (comma-separated header value, meaningful for clinicians only).
#[derive(Debug, Clone)]
pub struct IdentityContext {
    claims: Claims,
    location_ids: Vec<String>,
}

impl IdentityContext {
    pub fn new(claims: Claims, location_header: Option<&str>) -> Self {
        let location_ids = location_header.map(parse_location_header).unwrap_or_default();
        IdentityContext {
            claims,
            location_ids,
        }
    }

    pub fn patient_id(&self) -> Option<&str> {
        self.claims.patient_id.as_deref()
    }

    pub fn clinician_id(&self) -> Option<&str> {
        self.claims.clinician_id.as_deref()
    }

    pub fn system_id(&self) -> Option<&str> {
        self.claims.system_id.as_deref()
    }

    pub fn location_ids(&self) -> &[String] {
        &self.location_ids
    }

    /// The id/role pairs this caller is entitled to assert. Location ids only
    /// count when a clinician id is also present.
    pub fn asserted_ids(&self) -> Vec<(String, UserType)> {
        let mut ids = Vec::new();
        if let Some(patient) = &self.claims.patient_id {
            ids.push((patient.clone(), UserType::Patient));
        }
        if let Some(clinician) = &self.claims.clinician_id {
            ids.push((clinician.clone(), UserType::Clinician));
            for location in &self.location_ids {
                ids.push((location.clone(), UserType::Location));
            }
        }
        if let Some(system) = &self.claims.system_id {
            ids.push((system.clone(), UserType::System));
        }
        ids
    }

    pub fn holds_id(&self, id: &str) -> bool {
        self.asserted_ids().iter().any(|(held, _)| held == id)
    }

    /// Resolve the role a candidate id carries for this caller. Returning
    /// `None` means the role could not be determined, which is distinct from
    /// an access denial: callers fall back to broader query shapes.
    pub fn user_type_to_validate(&self, candidate: &str) -> Option<UserType> {
        if self.claims.patient_id.is_some() {
            return Some(UserType::Patient);
        }
        if let Some(clinician) = &self.claims.clinician_id {
            if candidate == clinician {
                return Some(UserType::Clinician);
            }
            if self.location_ids.iter().any(|loc| loc == candidate) {
                return Some(UserType::Location);
            }
        }
        None
    }

    /// Identity recorded in audit fields (created_by/modified_by).
    pub fn requester_id(&self) -> &str {
        self.claims
            .patient_id
            .as_deref()
            .or(self.claims.clinician_id.as_deref())
            .or(self.claims.system_id.as_deref())
            .unwrap_or("unknown")
    }

    /// True when this caller is exactly the named system identity and holds
    /// no other identity.
    pub fn is_sole_system(&self, system_id: &str) -> bool {
        self.claims.system_id.as_deref() == Some(system_id)
            && self.claims.patient_id.is_none()
            && self.claims.clinician_id.is_none()
    }
}

fn parse_location_header(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}
