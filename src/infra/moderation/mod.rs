pub mod policy_store;

pub use policy_store::{load_policy, JsonPolicyStore};
