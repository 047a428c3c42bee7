use super::{Balancer, SelectError};
use crate::Instance;
use arc_swap::ArcSwap;
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Prefers targets carrying the earliest matching tag in a preference list.
///
/// Tags are tried in order (e.g. same rack before same zone); within the
/// first tag that has any targets one is picked uniformly at random. When no
/// target carries any preferred tag, selection either falls back to
/// round-robin over all targets or fails, depending on [`TagAware::fallback`].
#[derive(Debug)]
pub struct TagAware {
    tags: Vec<String>,
    fallback: bool,
    state: ArcSwap<TagState>,
    next: AtomicUsize,
}

#[derive(Debug, Default)]
struct TagState {
    targets: Vec<Instance>,
    /// Indices into `targets`, one list per preferred tag.
    by_tag: Vec<Vec<usize>>,
}

impl TagAware {
    /// Creates a balancer preferring `tags` in the given order, with fallback
    /// disabled.
    pub fn new<I, T>(tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
            fallback: false,
            state: Default::default(),
            next: AtomicUsize::new(0),
        }
    }

    /// Sets whether to round-robin over all targets when none match a tag.
    pub fn fallback(self, fallback: bool) -> Self {
        Self { fallback, ..self }
    }
}

impl Balancer for TagAware {
    fn select(&self) -> Result<Instance, SelectError> {
        let state = self.state.load();
        if state.targets.is_empty() {
            return Err(SelectError::NoTargets);
        }

        if let Some(matching) = state.by_tag.iter().find(|m| !m.is_empty()) {
            let pick = matching[rand::rng().random_range(0..matching.len())];
            return Ok(state.targets[pick].clone());
        }

        if self.fallback {
            let idx = self.next.fetch_add(1, Ordering::Relaxed) % state.targets.len();
            return Ok(state.targets[idx].clone());
        }

        Err(SelectError::NoTagMatch {
            tags: self.tags.clone(),
        })
    }

    fn update_targets(&self, targets: Vec<Instance>) {
        let by_tag = self
            .tags
            .iter()
            .map(|tag| {
                targets
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| t.has_tag(tag))
                    .map(|(i, _)| i)
                    .collect()
            })
            .collect();
        self.state.store(TagState { targets, by_tag }.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{collections::HashSet, sync::atomic::AtomicBool};

    fn targets() -> Vec<Instance> {
        (0..10)
            .map(|i| {
                Instance::new(i.to_string(), format!("10.0.0.{i}"), 8080).with_tag(format!("tag{i}"))
            })
            .collect()
    }

    #[test]
    fn single_tag_hit() {
        let lb = TagAware::new(["tag1"]);
        lb.update_targets(targets());

        for _ in 0..100 {
            assert_eq!(lb.select().unwrap().id, "1");
        }
    }

    #[test]
    fn no_hit_without_fallback_fails() {
        let lb = TagAware::new(["no_tag"]);
        lb.update_targets(targets());

        for _ in 0..100 {
            assert_eq!(
                lb.select(),
                Err(SelectError::NoTagMatch {
                    tags: vec!["no_tag".into()]
                })
            );
        }
    }

    #[test]
    fn no_hit_with_fallback_succeeds() {
        let lb = TagAware::new(["no_tag"]).fallback(true);
        lb.update_targets(targets());

        let seen: HashSet<String> = (0..10).map(|_| lb.select().unwrap().id).collect();
        assert_eq!(seen.len(), 10);
    }

    #[test]
    fn random_pick_within_tag() {
        let mut targets = targets();
        targets[0].tags.push("duplicate_tag".into());
        targets[5].tags.push("duplicate_tag".into());
        let lb = TagAware::new(["duplicate_tag"]);
        lb.update_targets(targets);

        let seen: HashSet<String> = (0..1000).map(|_| lb.select().unwrap().id).collect();
        assert_eq!(seen, HashSet::from(["0".to_string(), "5".to_string()]));
    }

    #[test]
    fn earlier_tag_wins_regardless_of_target_order() {
        let x = Instance::new("x", "10.0.0.1", 80).with_tag("A");
        let y = Instance::new("y", "10.0.0.2", 80).with_tag("B");
        let z = Instance::new("z", "10.0.0.3", 80).with_tag("B");
        let lb = TagAware::new(["A", "B"]);

        for order in [
            vec![x.clone(), y.clone(), z.clone()],
            vec![z.clone(), y.clone(), x.clone()],
            vec![y.clone(), x.clone(), z.clone()],
        ] {
            lb.update_targets(order);
            for _ in 0..50 {
                assert_eq!(lb.select().unwrap().id, "x");
            }
        }
    }

    #[test]
    fn next_tag_used_once_preferred_tag_disappears() {
        let lb = TagAware::new(["rack", "zone"]);
        lb.update_targets(vec![
            Instance::new("r", "10.0.0.1", 80).with_tag("rack").with_tag("zone"),
            Instance::new("z", "10.0.0.2", 80).with_tag("zone"),
        ]);
        assert_eq!(lb.select().unwrap().id, "r");

        lb.update_targets(vec![Instance::new("z", "10.0.0.2", 80).with_tag("zone")]);
        for _ in 0..20 {
            assert_eq!(lb.select().unwrap().id, "z");
        }
    }

    #[test]
    fn empty_targets_fail_even_with_fallback() {
        let lb = TagAware::new(["tag1"]).fallback(true);
        assert_eq!(lb.select(), Err(SelectError::NoTargets));
    }
    #[test]
    fn selects_never_see_a_torn_update() {
        // every instance of `blue` is preferred, only `g1` of `green` is
        let blue: Vec<Instance> = (0..4)
            .map(|i| Instance::new(format!("b{i}"), format!("10.0.0.{i}"), 80).with_tag("zone"))
            .collect();
        let green: Vec<Instance> = (0..4)
            .map(|i| {
                let instance = Instance::new(format!("g{i}"), format!("10.1.0.{i}"), 80);
                if i == 1 {
                    instance.with_tag("zone")
                } else {
                    instance
                }
            })
            .collect();
        let lb = TagAware::new(["zone"]);
        lb.update_targets(blue.clone());
        let done = AtomicBool::new(false);

        std::thread::scope(|s| {
            s.spawn(|| {
                for i in 0..2_000 {
                    let next = if i % 2 == 0 { &green } else { &blue };
                    lb.update_targets(next.clone());
                }
                done.store(true, Ordering::Release);
            });
            for _ in 0..4 {
                s.spawn(|| {
                    while !done.load(Ordering::Acquire) {
                        let pick = lb.select().unwrap();
                        assert!(blue.contains(&pick) || pick.id == "g1", "picked {}", pick.id);
                    }
                });
            }
        });
    }
}
