//! Storage key constants and builders
//!
//! # Key Patterns
//!
//! - `destination:{id}` - Destination with its prefixes
//! - `reverse_destination:{prefix}` - Destination IDs containing a prefix
//! - `rating_plan:{id}` - Rating plan
//! - `rating_profile:{*out:tenant:category:subject}` - Rating profile
//! - `shared_group:{id}` - Shared group
//! - `account:{tenant:account}` - Account with its balances
//!
//! # Example
//!
//! ```
//! use ocs_store::keys;
//!
//! assert_eq!(keys::account_key("vdf:rif"), "account:vdf:rif");
//! assert_eq!(keys::reverse_destination_key("0256"), "reverse_destination:0256");
//! ```

pub const DESTINATION_PREFIX: &str = "destination";

pub const REVERSE_DESTINATION_PREFIX: &str = "reverse_destination";

pub const RATING_PLAN_PREFIX: &str = "rating_plan";

pub const RATING_PROFILE_PREFIX: &str = "rating_profile";

pub const SHARED_GROUP_PREFIX: &str = "shared_group";

pub const ACCOUNT_PREFIX: &str = "account";

pub fn destination_key(id: &str) -> String {
    format!("{}:{}", DESTINATION_PREFIX, id)
}

pub fn reverse_destination_key(prefix: &str) -> String {
    format!("{}:{}", REVERSE_DESTINATION_PREFIX, prefix)
}

pub fn rating_plan_key(id: &str) -> String {
    format!("{}:{}", RATING_PLAN_PREFIX, id)
}

pub fn rating_profile_key(profile_id: &str) -> String {
    format!("{}:{}", RATING_PROFILE_PREFIX, profile_id)
}

pub fn shared_group_key(id: &str) -> String {
    format!("{}:{}", SHARED_GROUP_PREFIX, id)
}

pub fn account_key(account_id: &str) -> String {
    format!("{}:{}", ACCOUNT_PREFIX, account_id)
}
