use crate::models::{BlogPost, EmbeddingConfig};

/// What an ingestion path should do with a post's embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingAction {
    Skip,
    Create,
    Migrate,
}

/// Classifies a post's embedding against the active model generation.
///
/// This is the single decision point both ingestion paths consult, so the
/// startup sweep and the change feed always agree on a post. The explicit
/// model tag wins; vector length acts as a sanity invariant and as the
/// fallback for untagged legacy posts.
#[derive(Debug, Clone)]
pub struct VersionPolicy {
    config: EmbeddingConfig,
}

impl VersionPolicy {
    pub fn new(config: EmbeddingConfig) -> Self {
        Self { config }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    pub fn is_known_stale(&self, dimensions: usize) -> bool {
        self.config.superseded_dimensions.contains(&dimensions)
    }

    /// Total over every post: returns exactly one action, and `Skip` implies
    /// the embedding length equals the current dimensions.
    pub fn classify(&self, post: &BlogPost) -> EmbeddingAction {
        let embedding = match post.embedding.as_deref() {
            None | Some([]) => return EmbeddingAction::Create,
            Some(values) => values,
        };

        let current_length = embedding.len() == self.config.dimensions;

        match post.embedding_model.as_deref() {
            Some(model) if model == self.config.model => {
                if current_length {
                    EmbeddingAction::Skip
                } else {
                    // Tag claims the current model but the length disagrees.
                    EmbeddingAction::Migrate
                }
            }
            Some(_) => EmbeddingAction::Migrate,
            // Untagged legacy post: infer the generation from the length.
            None if current_length => EmbeddingAction::Skip,
            None => EmbeddingAction::Migrate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{EmbeddingAction, VersionPolicy};
    use crate::models::EmbeddingConfig;
    use crate::testing::post;

    fn policy() -> VersionPolicy {
        VersionPolicy::new(EmbeddingConfig {
            model: "text-embedding-3-large".to_string(),
            dimensions: 8,
            superseded_dimensions: vec![4],
        })
    }

    #[test]
    fn missing_embedding_is_created() {
        let policy = policy();
        assert_eq!(
            policy.classify(&post("a", None, None)),
            EmbeddingAction::Create
        );
        assert_eq!(
            policy.classify(&post("b", Some(Vec::new()), None)),
            EmbeddingAction::Create
        );
    }

    #[test]
    fn untagged_current_length_is_skipped() {
        let policy = policy();
        let current = post("a", Some(vec![0.0; 8]), None);
        assert_eq!(policy.classify(&current), EmbeddingAction::Skip);
    }

    #[test]
    fn untagged_stale_length_is_migrated() {
        let policy = policy();
        let stale = post("a", Some(vec![0.0; 4]), None);
        assert_eq!(policy.classify(&stale), EmbeddingAction::Migrate);
    }

    #[test]
    fn unknown_length_is_still_migrated() {
        let policy = policy();
        let odd = post("a", Some(vec![0.0; 13]), None);
        assert_eq!(policy.classify(&odd), EmbeddingAction::Migrate);
    }

    #[test]
    fn tag_wins_over_a_coincidental_length_match() {
        let policy = policy();
        let other_model = post("a", Some(vec![0.0; 8]), Some("text-embedding-3-small"));
        assert_eq!(policy.classify(&other_model), EmbeddingAction::Migrate);
    }

    #[test]
    fn current_tag_with_wrong_length_is_migrated() {
        let policy = policy();
        let broken = post("a", Some(vec![0.0; 4]), Some("text-embedding-3-large"));
        assert_eq!(policy.classify(&broken), EmbeddingAction::Migrate);
    }

    #[test]
    fn current_tag_and_length_is_skipped() {
        let policy = policy();
        let current = post("a", Some(vec![0.0; 8]), Some("text-embedding-3-large"));
        assert_eq!(policy.classify(&current), EmbeddingAction::Skip);
    }

    #[test]
    fn superseded_dimensions_are_reported() {
        let policy = policy();
        assert!(policy.is_known_stale(4));
        assert!(!policy.is_known_stale(8));
        assert!(!policy.is_known_stale(13));
    }
}
