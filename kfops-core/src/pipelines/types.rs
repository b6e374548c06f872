//! Wire types for the v2beta1 pipeline API.
//!
//! The server omits empty collections and unset fields, so every list and
//! most scalars default.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    pub pipeline_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// One uploaded version of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineVersion {
    #[serde(default)]
    pub pipeline_id: String,
    pub pipeline_version_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// An experiment grouping runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Experiment {
    pub experiment_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_state: Option<String>,
}

/// A single pipeline execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub run_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experiment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// A listing response that can be paged through.
pub trait Page: serde::de::DeserializeOwned {
    type Item;

    /// Split into the items on this page and the token for the next one.
    fn into_parts(self) -> (Vec<Self::Item>, Option<String>);
}

macro_rules! list_response {
    ($name:ident, $field:ident, $item:ty) => {
        #[derive(Debug, Clone, Default, Serialize, Deserialize)]
        pub struct $name {
            #[serde(default)]
            pub $field: Vec<$item>,
            #[serde(default)]
            pub total_size: Option<i64>,
            #[serde(default)]
            pub next_page_token: Option<String>,
        }

        impl Page for $name {
            type Item = $item;

            fn into_parts(self) -> (Vec<$item>, Option<String>) {
                let token = self.next_page_token.filter(|t| !t.is_empty());
                (self.$field, token)
            }
        }
    };
}

list_response!(ListPipelinesResponse, pipelines, Pipeline);
list_response!(ListPipelineVersionsResponse, pipeline_versions, PipelineVersion);
list_response!(ListExperimentsResponse, experiments, Experiment);
list_response!(ListRunsResponse, runs, Run);

/// Server-side list filter, sent JSON-encoded in the `filter` query parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Filter {
    pub predicates: Vec<Predicate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Predicate {
    pub key: String,
    pub operation: String,
    pub string_value: String,
}

impl Filter {
    /// Filter matching `display_name == name`.
    pub fn display_name_equals(name: &str) -> Self {
        Self {
            predicates: vec![Predicate {
                key: "display_name".to_string(),
                operation: "EQUALS".to_string(),
                string_value: name.to_string(),
            }],
        }
    }
}
