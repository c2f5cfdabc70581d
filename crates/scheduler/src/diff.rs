use tracing::debug;
use vss_core::ScheduleRule;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerDiff {
    pub to_delete: Vec<usize>,
    pub to_create: Vec<ScheduleRule>,
}

impl TriggerDiff {
    pub fn is_empty(&self) -> bool {
        self.to_delete.is_empty() && self.to_create.is_empty()
    }

    /// Deletion indices from highest to lowest, so removing one trigger never
    /// shifts a trigger that is still waiting to be removed.
    pub fn deletion_order(&self) -> Vec<usize> {
        let mut order = self.to_delete.clone();
        order.sort_unstable_by(|a, b| b.cmp(a));
        order.dedup();
        order
    }
}

/// Pairs current rules with the desired rules they satisfy, as a maximum
/// matching over content-sorted inputs. Unpaired current rules are deleted;
/// unpaired desired rules are created unless `removing`.
pub fn diff(current: &[ScheduleRule], desired: &[ScheduleRule], removing: bool) -> TriggerDiff {
    let have = content_order(current);
    let want = content_order(desired);

    // matched[h] is the desired slot paired with current slot h.
    let mut matched: Vec<Option<usize>> = vec![None; have.len()];
    for w in 0..want.len() {
        let mut seen = vec![false; have.len()];
        augment(w, current, desired, &have, &want, &mut matched, &mut seen);
    }

    let mut kept_current = vec![false; current.len()];
    let mut kept_desired = vec![false; desired.len()];
    for (h, pair) in matched.iter().enumerate() {
        if let Some(w) = pair {
            kept_current[have[h]] = true;
            kept_desired[want[*w]] = true;
        }
    }

    let mut to_delete = Vec::new();
    for (rule, kept) in current.iter().zip(&kept_current) {
        if *kept {
            continue;
        }
        match rule.index {
            Some(index) => to_delete.push(index),
            None => debug!(kind = %rule.kind(), "extra trigger has no index, cannot delete"),
        }
    }

    let to_create = if removing {
        Vec::new()
    } else {
        desired
            .iter()
            .zip(&kept_desired)
            .filter(|(_, kept)| !**kept)
            .map(|(rule, _)| rule.clone())
            .collect()
    };

    TriggerDiff {
        to_delete,
        to_create,
    }
}

fn content_order(rules: &[ScheduleRule]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..rules.len()).collect();
    order.sort_by(|a, b| {
        let (a, b) = (&rules[*a], &rules[*b]);
        (
            &a.recurrence,
            a.start_date,
            a.start_time,
            a.enabled,
            a.minutes_interval,
            a.minutes_duration,
        )
            .cmp(&(
                &b.recurrence,
                b.start_date,
                b.start_time,
                b.enabled,
                b.minutes_interval,
                b.minutes_duration,
            ))
    });
    order
}

/// Kuhn's augmenting path step for desired slot `w`.
fn augment(
    w: usize,
    current: &[ScheduleRule],
    desired: &[ScheduleRule],
    have: &[usize],
    want: &[usize],
    matched: &mut [Option<usize>],
    seen: &mut [bool],
) -> bool {
    for h in 0..have.len() {
        if seen[h] || !current[have[h]].satisfies(&desired[want[w]]) {
            continue;
        }
        seen[h] = true;
        let partner = matched[h];
        let free = match partner {
            None => true,
            Some(other) => augment(other, current, desired, have, want, matched, seen),
        };
        if free {
            matched[h] = Some(w);
            return true;
        }
    }
    false
}
