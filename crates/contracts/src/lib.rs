use serde::{Deserialize, Serialize};

pub mod flow;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessProfile {
    #[serde(default)]
    pub business_name: String,
    #[serde(default)]
    pub business_type: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub primary_service: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gmb_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ideal_customer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_goal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl BusinessProfile {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.business_name.trim().is_empty() {
            return Err("businessName is required");
        }
        if self.business_type.trim().is_empty() {
            return Err("businessType is required");
        }
        if self.location.trim().is_empty() {
            return Err("location is required");
        }
        if self.primary_service.trim().is_empty() {
            return Err("primaryService is required");
        }
        if let Some(email) = self.email.as_deref().map(str::trim).filter(|e| !e.is_empty())
            && !is_wellformed_email(email)
        {
            return Err("email must be a valid email address");
        }
        Ok(())
    }
}

fn is_wellformed_email(raw: &str) -> bool {
    let Some((local, domain)) = raw.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.is_empty() || raw.contains(char::is_whitespace) {
        return false;
    }
    let Some((host, tld)) = domain.rsplit_once('.') else {
        return false;
    };
    !host.is_empty() && !tld.is_empty()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub title: String,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedReport {
    pub overall_score: i64,
    pub score_explanation: String,
    pub profile_recommendations: Vec<Recommendation>,
    pub website_recommendations: Vec<Recommendation>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaViolation {
    Missing(String),
    Mismatched {
        field: String,
        expected: &'static str,
    },
}

impl SchemaViolation {
    pub fn field(&self) -> &str {
        match self {
            SchemaViolation::Missing(field) => field,
            SchemaViolation::Mismatched { field, .. } => field,
        }
    }
}

impl std::fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaViolation::Missing(field) => {
                write!(f, "missing required field {}", field)
            }
            SchemaViolation::Mismatched { field, expected } => {
                write!(f, "field {} must be {}", field, expected)
            }
        }
    }
}

impl std::error::Error for SchemaViolation {}

impl ParsedReport {
    pub fn from_value(value: &serde_json::Value) -> Result<Self, SchemaViolation> {
        let object = value.as_object().ok_or(SchemaViolation::Mismatched {
            field: "report".to_string(),
            expected: "a JSON object",
        })?;

        let overall_score = require(object, "overallScore")?
            .as_i64()
            .filter(|score| (0..=100).contains(score))
            .ok_or(SchemaViolation::Mismatched {
                field: "overallScore".to_string(),
                expected: "an integer between 0 and 100",
            })?;

        let score_explanation = string_field(object, "scoreExplanation")?;
        let profile_recommendations = recommendation_field(object, "profileRecommendations")?;
        let website_recommendations = recommendation_field(object, "websiteRecommendations")?;

        if profile_recommendations.is_empty() && website_recommendations.is_empty() {
            return Err(SchemaViolation::Mismatched {
                field: "profileRecommendations".to_string(),
                expected: "non-empty in at least one recommendation section",
            });
        }

        Ok(Self {
            overall_score,
            score_explanation,
            profile_recommendations,
            website_recommendations,
        })
    }
}

fn require<'a>(
    object: &'a serde_json::Map<String, serde_json::Value>,
    field: &str,
) -> Result<&'a serde_json::Value, SchemaViolation> {
    match object.get(field) {
        Some(serde_json::Value::Null) | None => Err(SchemaViolation::Missing(field.to_string())),
        Some(value) => Ok(value),
    }
}

fn string_field(
    object: &serde_json::Map<String, serde_json::Value>,
    field: &str,
) -> Result<String, SchemaViolation> {
    require(object, field)?
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or(SchemaViolation::Mismatched {
            field: field.to_string(),
            expected: "a non-empty string",
        })
}

fn recommendation_field(
    object: &serde_json::Map<String, serde_json::Value>,
    field: &str,
) -> Result<Vec<Recommendation>, SchemaViolation> {
    let items = require(object, field)?
        .as_array()
        .ok_or(SchemaViolation::Mismatched {
            field: field.to_string(),
            expected: "an array",
        })?;

    let mut recommendations = Vec::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        let item = item.as_object().ok_or(SchemaViolation::Mismatched {
            field: format!("{}[{}]", field, idx),
            expected: "an object",
        })?;
        let title = string_field(item, "title").map_err(|_| SchemaViolation::Mismatched {
            field: format!("{}[{}].title", field, idx),
            expected: "a non-empty string",
        })?;
        let action = string_field(item, "action").map_err(|_| SchemaViolation::Mismatched {
            field: format!("{}[{}].action", field, idx),
            expected: "a non-empty string",
        })?;
        recommendations.push(Recommendation { title, action });
    }

    Ok(recommendations)
}
