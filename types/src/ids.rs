use std::fmt;

/// Declares an opaque string identifier.
///
/// Identifiers are tenant-, schema-, submission-scoped handles handed to the
/// core by the surrounding application. The core never inspects their
/// contents; `generate` exists for the components that mint new records
/// (submissions, deliveries, runs).
macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Mint a fresh random identifier.
            #[must_use]
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Tenant owning a schema, submission, or webhook.
    TenantId
);
string_id!(
    /// Human or service principal that performed an action.
    ActorId
);
string_id!(SchemaId);
string_id!(SubmissionId);
string_id!(WebhookId);
string_id!(DeliveryId);
string_id!(
    /// One execution of the crawl + extract pipeline. Artifact keys are
    /// namespaced under this id so runs never collide in storage.
    RunId
);
