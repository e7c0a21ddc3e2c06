use crate::crd::balancer::BalancerStatus;

use super::diff::BackendDiff;

/// Status is derived strictly from the partition sizes of the latest diff.
pub fn from_diff(diff: &BackendDiff) -> BalancerStatus {
    BalancerStatus {
        active_backends: diff.active.len() as i32,
        obsolete_backends: diff.to_delete.len() as i32,
    }
}

/// Only issue a status write when the computed status differs from what is
/// stored, to avoid resource-version churn.
pub fn changed(current: Option<&BalancerStatus>, desired: &BalancerStatus) -> bool {
    current != Some(desired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::diff::partition;

    #[test]
    fn counts_follow_partition_sizes() {
        let diff = partition(vec![], vec![]);
        assert_eq!(
            from_diff(&diff),
            BalancerStatus {
                active_backends: 0,
                obsolete_backends: 0
            }
        );
    }

    #[test]
    fn unchanged_status_is_not_rewritten() {
        let status = BalancerStatus {
            active_backends: 2,
            obsolete_backends: 1,
        };
        assert!(!changed(Some(&status), &status.clone()));
        assert!(changed(None, &status));
        assert!(changed(
            Some(&BalancerStatus::default()),
            &status
        ));
    }
}
