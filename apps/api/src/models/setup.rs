use serde::{Deserialize, Serialize};

use crate::errors::AppError;

const MAX_JOB_ROLE_CHARS: usize = 120;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExperienceLevel {
    #[serde(rename = "0-2")]
    Junior,
    #[default]
    #[serde(rename = "3-6")]
    MidCareer,
    #[serde(rename = "7+")]
    Senior,
}

/// Hiring standard the interviewer should calibrate to.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum HiringMarket {
    #[default]
    #[serde(rename = "Global / US", alias = "Global/US")]
    GlobalUs,
    #[serde(rename = "India")]
    India,
    #[serde(rename = "UK / Europe", alias = "UK/Europe")]
    UkEurope,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum InterviewType {
    General,
    #[default]
    Behavioral,
    Technical,
    Leadership,
}

/// Practice session configuration collected on the setup screen.
/// Immutable for the lifetime of a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSetup {
    pub job_role: String,
    #[serde(default)]
    pub experience_level: ExperienceLevel,
    #[serde(default)]
    pub country: HiringMarket,
    #[serde(default)]
    pub interview_type: InterviewType,
}

impl SessionSetup {
    pub fn validate(&self) -> Result<(), AppError> {
        let role = self.job_role.trim();
        if role.is_empty() {
            return Err(AppError::Validation("jobRole cannot be empty".to_string()));
        }
        if role.chars().count() > MAX_JOB_ROLE_CHARS {
            return Err(AppError::Validation(format!(
                "jobRole must be at most {MAX_JOB_ROLE_CHARS} characters"
            )));
        }
        Ok(())
    }
}
