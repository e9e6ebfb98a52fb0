use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TestRecord {
    pub id: String,
    pub registration_id: String,
    pub test_type: String,
    pub result: String,
    pub test_date: Option<String>,
    pub notes: Option<String>,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
}

pub const SELECT_TEST_RECORD: &str =
    "SELECT id, registration_id, test_type, result, test_date, notes, created_by, created_at, updated_at
     FROM test_records";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestType {
    Hiv,
    Hcv,
    Syphilis,
    Bloodwork,
    Other,
}

impl TestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestType::Hiv => "hiv",
            TestType::Hcv => "hcv",
            TestType::Syphilis => "syphilis",
            TestType::Bloodwork => "bloodwork",
            TestType::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestResult {
    #[default]
    Pending,
    Negative,
    Positive,
    Reactive,
    NonReactive,
    Indeterminate,
}

impl TestResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestResult::Pending => "pending",
            TestResult::Negative => "negative",
            TestResult::Positive => "positive",
            TestResult::Reactive => "reactive",
            TestResult::NonReactive => "non_reactive",
            TestResult::Indeterminate => "indeterminate",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTestRequest {
    pub test_type: TestType,
    #[serde(default)]
    pub result: TestResult,
    pub test_date: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTestRequest {
    pub test_type: Option<TestType>,
    pub result: Option<TestResult>,
    pub test_date: Option<String>,
    pub notes: Option<String>,
}
