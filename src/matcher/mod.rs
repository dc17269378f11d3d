//! Reuse matching for idle instances.
//!
//! Matching is staged so the cheap comparisons run first: environment, then
//! the literal image and flavor strings preserved from the creating request,
//! and only when the literals differ does the matcher fall back to resolving
//! identifiers at the provider. With the previous-image fallback enabled, an
//! instance booted from the generation published immediately before the
//! newest one still matches a request for that image name.

#[cfg(test)]
mod tests;

use crate::config::ClusterProfile;
use crate::model::CreateAgentRequest;
use crate::provider::ComputeProvider;
use crate::registry::InstanceRegistry;

/// The attributes a reuse candidate must satisfy.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReuseProposal {
    /// Environment tag the work requires; empty when untagged.
    pub environment: String,
    /// Image identifier-or-name after profile defaults are applied.
    pub image: String,
    /// Flavor identifier-or-name after profile defaults are applied.
    pub flavor: String,
    /// Whether the previous published image generation is acceptable.
    pub use_previous_image: bool,
}

impl ReuseProposal {
    /// Builds a proposal from a request, filling gaps from the profile.
    #[must_use]
    pub fn from_request(request: &CreateAgentRequest, profile: &ClusterProfile) -> Self {
        Self {
            environment: request.environment_or_empty().to_owned(),
            image: request.image_or_default(profile),
            flavor: request.flavor_or_default(profile),
            use_previous_image: profile.use_previous_image,
        }
    }
}

/// Decides whether a known instance can serve a new piece of work.
#[derive(Clone, Copy, Debug)]
pub struct InstanceMatcher<'a, P> {
    registry: &'a InstanceRegistry,
    provider: &'a P,
}

impl<'a, P: ComputeProvider> InstanceMatcher<'a, P> {
    /// Creates a matcher over the given registry and provider.
    #[must_use]
    pub const fn new(registry: &'a InstanceRegistry, provider: &'a P) -> Self {
        Self { registry, provider }
    }

    /// Returns true when the registered instance satisfies the proposal.
    ///
    /// Unknown instance ids are an ordinary non-match. A resolution miss at
    /// the provider fails the stage being compared, not the call.
    ///
    /// # Errors
    ///
    /// Propagates provider errors raised while resolving identifiers.
    pub async fn matches(
        &self,
        instance_id: &str,
        proposal: &ReuseProposal,
    ) -> Result<bool, P::Error> {
        let Some(instance) = self.registry.find(instance_id) else {
            tracing::debug!(instance_id, "reuse candidate is not registered");
            return Ok(false);
        };
        if !instance
            .environment
            .eq_ignore_ascii_case(&proposal.environment)
        {
            tracing::debug!(
                instance_id,
                instance_environment = %instance.environment,
                requested_environment = %proposal.environment,
                "environment mismatch",
            );
            return Ok(false);
        }
        if !self.image_matches(&instance.image, proposal).await? {
            tracing::debug!(
                instance_id,
                instance_image = %instance.image,
                requested_image = %proposal.image,
                "image mismatch",
            );
            return Ok(false);
        }
        if !self.flavor_matches(&instance.flavor, &proposal.flavor).await? {
            tracing::debug!(
                instance_id,
                instance_flavor = %instance.flavor,
                requested_flavor = %proposal.flavor,
                "flavor mismatch",
            );
            return Ok(false);
        }
        Ok(true)
    }

    async fn image_matches(
        &self,
        instance_image: &str,
        proposal: &ReuseProposal,
    ) -> Result<bool, P::Error> {
        if instance_image == proposal.image {
            return Ok(true);
        }
        // An unresolvable image can have no previous generation either.
        let Some(resolved) = self.provider.resolve_image_id(&proposal.image).await? else {
            return Ok(false);
        };
        if resolved == instance_image {
            return Ok(true);
        }
        if proposal.use_previous_image {
            let previous = self
                .provider
                .resolve_previous_image_id(&proposal.image)
                .await?;
            if previous.as_deref() == Some(instance_image) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn flavor_matches(
        &self,
        instance_flavor: &str,
        requested_flavor: &str,
    ) -> Result<bool, P::Error> {
        if instance_flavor == requested_flavor {
            return Ok(true);
        }
        let resolved = self.provider.resolve_flavor_id(requested_flavor).await?;
        Ok(resolved.as_deref() == Some(instance_flavor))
    }
}
