//! Image ancestry check: image `A` descends from image `B` iff `B`'s layer
//! chain is a prefix of `A`'s. Used by callers that prefer ancestry over
//! label checks when validating an image override.

pub fn is_descendant(a_layers: &[String], b_layers: &[String]) -> bool {
    if b_layers.len() > a_layers.len() {
        return false;
    }
    a_layers.iter().zip(b_layers.iter()).all(|(a, b)| a == b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_base_is_ancestor_of_anything() {
        assert!(is_descendant(&["l1".into(), "l2".into()], &[]));
    }

    #[test]
    fn prefix_match_is_descendant() {
        let a = vec!["l1".to_string(), "l2".to_string(), "l3".to_string()];
        let b = vec!["l1".to_string(), "l2".to_string()];
        assert!(is_descendant(&a, &b));
    }

    #[test]
    fn divergent_chain_is_not_descendant() {
        let a = vec!["l1".to_string(), "l2x".to_string()];
        let b = vec!["l1".to_string(), "l2".to_string()];
        assert!(!is_descendant(&a, &b));
    }

    #[test]
    fn longer_base_than_target_is_never_descendant() {
        let a = vec!["l1".to_string()];
        let b = vec!["l1".to_string(), "l2".to_string()];
        assert!(!is_descendant(&a, &b));
    }
}
