//! Rating resolver
//!
//! Finds the rating plan activations that price a call: the profile of the
//! subject (then `*any`, then the descriptor's fallback subjects), one
//! `RatingInfo` per activation window, destination matched longest prefix
//! first. Activations that do not cover the destination hand over to their
//! fallback keys through a bounded, cycle-checked walk.

use chrono::{DateTime, Utc};
use ocs_core::consts::{ANY, KEY_SEPARATOR, OUTBOUND};
use ocs_core::error::RatingError;
use ocs_core::models::{
    CallDescriptor, Destination, RatingActivation, RatingInfo, RatingPlan, RatingProfile,
};
use ocs_core::traits::CatalogStore;
use ocs_core::RatingResult;
use std::collections::HashSet;
use tracing::{debug, error, instrument};

/// Outcome of resolving a call
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// No profile for the subject, `*any` or any fallback subject
    Unrated,
    /// One entry per activation window, in time order
    Rated(Vec<RatingInfo>),
}

/// Prefixes of a destination, longest first, with the IDs containing each
pub type PrefixIndex = Vec<(String, Vec<String>)>;

/// Rating resolver over a catalog store
pub struct RatingResolver<'a, S: CatalogStore + ?Sized> {
    store: &'a S,
    min_prefix_match: usize,
    max_depth: u32,
}

impl<'a, S: CatalogStore + ?Sized> RatingResolver<'a, S> {
    pub fn new(store: &'a S, min_prefix_match: usize, max_depth: u32) -> Self {
        Self {
            store,
            min_prefix_match,
            max_depth,
        }
    }

    /// Look up the destination IDs of every prefix of `destination`
    pub async fn prefix_index(&self, destination: &str) -> RatingResult<PrefixIndex> {
        let mut index = Vec::new();
        if destination == ANY {
            return Ok(index);
        }
        for prefix in Destination::split_prefix(destination, self.min_prefix_match) {
            let ids = self.store.get_reverse_destination(&prefix).await?;
            if !ids.is_empty() {
                index.push((prefix, ids));
            }
        }
        Ok(index)
    }

    /// All destination IDs the dialed number belongs to, longest prefix first
    pub async fn destination_ids(&self, destination: &str) -> RatingResult<Vec<String>> {
        let mut ids: Vec<String> = Vec::new();
        for (_, matched) in self.prefix_index(destination).await? {
            for id in matched {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        Ok(ids)
    }

    /// Resolve the rating infos of a call
    ///
    /// # Errors
    ///
    /// - `UnauthorizedDestination` when a profile exists but no plan covers
    ///   the destination
    /// - `MaxRecursionDepth` when fallback keys nest too deep or loop
    /// - `NotFound` when an activation references a missing plan
    /// - storage errors verbatim
    #[instrument(skip(self, cd), fields(subject = %cd.subject, destination = %cd.destination))]
    pub async fn resolve(&self, cd: &CallDescriptor) -> RatingResult<Resolution> {
        let prefixes = self.prefix_index(&cd.destination).await?;

        let mut subjects: Vec<&str> = vec![cd.subject.as_str()];
        subjects.push(ANY);
        subjects.extend(cd.fallback_subjects.iter().map(String::as_str));

        let mut tried = HashSet::new();
        let mut profile_found = false;
        for subject in subjects {
            if !tried.insert(subject) {
                continue;
            }
            let key = cd.profile_key(subject);
            let Some(mut profile) = self.store.get_rating_profile(&key).await? else {
                debug!("No rating profile {}", key);
                continue;
            };
            profile_found = true;
            profile.sort();

            if let Some(infos) = self.resolve_profile(&profile, cd, &prefixes).await? {
                debug!(
                    "Resolved {} rating windows through profile {}",
                    infos.len(),
                    profile.id
                );
                return Ok(Resolution::Rated(infos));
            }
            debug!(
                "Profile {} does not cover destination {}",
                profile.id, cd.destination
            );
        }

        if profile_found {
            Err(RatingError::UnauthorizedDestination(cd.destination.clone()))
        } else {
            Ok(Resolution::Unrated)
        }
    }

    /// Resolve every activation window of a profile, `None` if any window
    /// cannot price the destination
    async fn resolve_profile(
        &self,
        profile: &RatingProfile,
        cd: &CallDescriptor,
        prefixes: &PrefixIndex,
    ) -> RatingResult<Option<Vec<RatingInfo>>> {
        let mut infos = Vec::new();
        for (activation, window_start, window_end) in profile.windows(cd.time_start, cd.time_end) {
            match self
                .resolve_window(profile, activation, window_start, window_end, cd, prefixes)
                .await?
            {
                Some(info) => infos.push(info),
                None => return Ok(None),
            }
        }
        Ok(Some(infos))
    }

    async fn resolve_window(
        &self,
        profile: &RatingProfile,
        activation: &RatingActivation,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        cd: &CallDescriptor,
        prefixes: &PrefixIndex,
    ) -> RatingResult<Option<RatingInfo>> {
        let plan = self.load_plan(&activation.rating_plan_id).await?;
        if let Some((prefix, dest_id)) = match_destination(&plan, &cd.destination, prefixes) {
            return build_info(&profile.id, activation, &plan, prefix, dest_id, window_start, window_end)
                .map(Some);
        }

        let mut visited: HashSet<String> = HashSet::from([profile.id.clone()]);
        let mut pending: Vec<(String, u32)> = activation
            .fallback_keys
            .iter()
            .rev()
            .map(|key| (fallback_profile_key(profile, key), 1))
            .collect();

        while let Some((key, depth)) = pending.pop() {
            if depth > self.max_depth || !visited.insert(key.clone()) {
                error!(
                    "Fallback chain for {} exceeded depth {} at {}",
                    profile.id, self.max_depth, key
                );
                return Err(RatingError::MaxRecursionDepth(key));
            }
            let Some(mut fallback) = self.store.get_rating_profile(&key).await? else {
                debug!("Fallback profile {} not found", key);
                continue;
            };
            fallback.sort();
            let Some(fallback_activation) = fallback.activation_at(window_start) else {
                continue;
            };

            let plan = self.load_plan(&fallback_activation.rating_plan_id).await?;
            if let Some((prefix, dest_id)) = match_destination(&plan, &cd.destination, prefixes) {
                debug!("Destination {} priced by fallback {}", cd.destination, fallback.id);
                return build_info(
                    &fallback.id,
                    fallback_activation,
                    &plan,
                    prefix,
                    dest_id,
                    window_start,
                    window_end,
                )
                .map(Some);
            }
            pending.extend(
                fallback_activation
                    .fallback_keys
                    .iter()
                    .rev()
                    .map(|next| (fallback_profile_key(&fallback, next), depth + 1)),
            );
        }
        Ok(None)
    }

    async fn load_plan(&self, id: &str) -> RatingResult<RatingPlan> {
        self.store.get_rating_plan(id).await?.ok_or_else(|| {
            error!("Rating plan {} referenced by a profile is missing", id);
            RatingError::NotFound(format!("rating plan {}", id))
        })
    }
}

/// Accept full profile keys as well as bare subjects
fn fallback_profile_key(profile: &RatingProfile, key: &str) -> String {
    let full_prefix = format!("{}{}", OUTBOUND, KEY_SEPARATOR);
    if key.starts_with(&full_prefix) {
        key.to_string()
    } else {
        profile.fallback_key(key)
    }
}

/// Longest matching prefix whose destination the plan prices, else `*any`
fn match_destination(
    plan: &RatingPlan,
    destination: &str,
    prefixes: &PrefixIndex,
) -> Option<(String, String)> {
    if destination != ANY {
        for (prefix, ids) in prefixes {
            if let Some(id) = ids.iter().find(|id| plan.has_destination(id)) {
                return Some((prefix.clone(), id.clone()));
            }
        }
    }
    plan.has_destination(ANY)
        .then(|| (ANY.to_string(), ANY.to_string()))
}

fn build_info(
    profile_id: &str,
    activation: &RatingActivation,
    plan: &RatingPlan,
    prefix: String,
    dest_id: String,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> RatingResult<RatingInfo> {
    Ok(RatingInfo {
        matched_subject: profile_id.to_string(),
        rate_intervals: plan.rate_intervals(&dest_id)?,
        matched_prefix: prefix,
        matched_dest_id: dest_id,
        rating_plan_id: plan.id.clone(),
        activation_time: activation.activation_time,
        fallback_keys: activation.fallback_keys.clone(),
        window_start,
        window_end,
    })
}
