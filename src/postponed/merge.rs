use std::cmp::Ordering;

use super::{FormatRange, PostponedTask, TaskKind};

/// The order in which a flush runs a batch of postponed tasks.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Plan {
    /// Formatting outside of any reindented range. Ascending, never overlapping.
    pub free_formatting: Vec<PostponedTask>,
    /// Ascending, never overlapping.
    pub reindent: Vec<PostponedTask>,
    /// Formatting that lies inside a reindented range. It runs in the next pass, once the
    /// reindent has moved the text under it.
    pub deferred: Vec<PostponedTask>,
}

impl Plan {
    pub fn format_ranges(&self) -> Vec<FormatRange> {
        self.free_formatting.iter().map(FormatRange::from).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.free_formatting.is_empty() && self.reindent.is_empty() && self.deferred.is_empty()
    }

    fn push(&mut self, task: PostponedTask) {
        if task.is_reindent() {
            self.reindent.push(task);
        } else {
            self.free_formatting.push(task);
        }
    }
}

/// Ends descending. On equal ends, empty ranges first, then starts ascending.
fn order(a: &PostponedTask, b: &PostponedTask) -> Ordering {
    b.range.end.cmp(&a.range.end).then_with(|| {
        if a.range.start == b.range.start {
            Ordering::Equal
        } else if a.range.is_empty() {
            Ordering::Less
        } else if b.range.is_empty() {
            Ordering::Greater
        } else {
            a.range.start.cmp(&b.range.start)
        }
    })
}

/// Whether two tasks whose ranges only touch may be merged.
fn can_stick(accumulated: &PostponedTask, next: &PostponedTask) -> bool {
    let empty_leading = |task: &PostponedTask| task.with_leading_whitespace() && task.range.is_empty();
    !empty_leading(accumulated) && !empty_leading(next) && !accumulated.is_reindent()
}

fn union(accumulated: PostponedTask, next: PostponedTask) -> PostponedTask {
    let start = accumulated.range.start.min(next.range.start);
    let end = accumulated.range.end.max(next.range.end);
    // the leading whitespace belongs to whichever task starts the merged range
    let leading = [&accumulated, &next]
        .iter()
        .any(|task| task.range.start == start && task.with_leading_whitespace());
    let kind = if leading {
        TaskKind::ReformatWithLeadingWhitespace
    } else {
        TaskKind::Reformat
    };
    PostponedTask::new(start..end, kind)
}

/// Turns an arbitrary batch of tasks into non overlapping formatting and reindent ranges.
///
/// Touching and overlapping formatting ranges merge into one. A formatting range that overlaps
/// a reindent is split around it: the part before keeps its kind, the part after is formatted
/// together with its leading whitespace, and whatever falls inside the reindent is deferred.
/// Duplicate reindents of overlapping ranges are dropped.
pub fn normalize(tasks: impl IntoIterator<Item = PostponedTask>) -> Plan {
    let mut queue: Vec<PostponedTask> = tasks.into_iter().collect();
    // popped from the back
    queue.sort_by(|a, b| order(b, a));

    let mut plan = Plan::default();

    let Some(mut accumulated) = queue.pop() else {
        return plan;
    };
    while let Some(next) = queue.pop() {
        let apart = accumulated.range.start > next.range.end
            || (accumulated.range.start == next.range.end && !can_stick(&accumulated, &next));
        if apart {
            plan.push(accumulated);
            accumulated = next;
        } else if !accumulated.is_reindent() && next.is_reindent() {
            if accumulated.range.start < next.range.start {
                let head = PostponedTask::new(
                    accumulated.range.start..next.range.start,
                    accumulated.kind,
                );
                let at = queue.partition_point(|task| order(task, &head) == Ordering::Greater);
                queue.insert(at, head);
            }
            if next.range.end < accumulated.range.end {
                plan.free_formatting.push(PostponedTask::reformat_with_leading_whitespace(
                    next.range.end..accumulated.range.end,
                ));
            }
            accumulated = next;
        } else if !accumulated.is_reindent() {
            accumulated = union(accumulated, next);
        } else if !next.is_reindent() {
            plan.deferred.push(next);
        }
    }
    plan.push(accumulated);

    plan.free_formatting.reverse();
    plan.reindent.reverse();
    plan.deferred.sort_by_key(|task| (task.range.start, task.range.end));
    plan
}

#[cfg(test)]
mod tests {
    use std::ops::Range;

    use rstest::rstest;

    use super::{normalize, PostponedTask, TaskKind};

    fn r(range: Range<usize>) -> PostponedTask {
        PostponedTask::reformat(range)
    }

    fn lw(range: Range<usize>) -> PostponedTask {
        PostponedTask::reformat_with_leading_whitespace(range)
    }

    fn ri(range: Range<usize>) -> PostponedTask {
        PostponedTask::reindent(range, 0)
    }

    #[test]
    fn empty() {
        assert!(normalize(Vec::new()).is_empty());
    }

    #[rstest]
    #[case::in_order([0, 1, 2])]
    #[case::swap_tail([0, 2, 1])]
    #[case::reindent_first([1, 0, 2])]
    #[case::rotated([1, 2, 0])]
    #[case::last_first([2, 0, 1])]
    #[case::reversed([2, 1, 0])]
    fn reformat_around_reindent(#[case] order: [usize; 3]) {
        let tasks = [r(0..10), ri(10..20), r(20..30)];
        let plan = normalize(order.map(|i| tasks[i].clone()));
        assert_eq!(plan.free_formatting, vec![r(0..10), lw(20..30)]);
        assert_eq!(plan.reindent, vec![ri(10..20)]);
        assert!(plan.deferred.is_empty());
    }

    #[test]
    fn reindent_inside_reformat() {
        let plan = normalize(vec![r(0..10), ri(5..8)]);
        assert_eq!(plan.free_formatting, vec![r(0..5), lw(8..10)]);
        assert_eq!(plan.reindent, vec![ri(5..8)]);
    }

    #[test]
    fn leading_whitespace_head_keeps_its_kind() {
        let plan = normalize(vec![lw(0..10), ri(5..8)]);
        assert_eq!(plan.free_formatting, vec![lw(0..5), lw(8..10)]);
        assert_eq!(plan.reindent, vec![ri(5..8)]);
    }

    #[test]
    fn reformat_inside_reindent_is_deferred() {
        let plan = normalize(vec![ri(0..10), r(3..6)]);
        assert!(plan.free_formatting.is_empty());
        assert_eq!(plan.reindent, vec![ri(0..10)]);
        assert_eq!(plan.deferred, vec![r(3..6)]);
    }

    #[test]
    fn overlapping_reindents_collapse() {
        let plan = normalize(vec![ri(0..10), ri(2..10), ri(12..14)]);
        assert_eq!(plan.reindent, vec![ri(0..10), ri(12..14)]);
    }

    #[test]
    fn overlapping_reformats_merge() {
        let plan = normalize(vec![r(5..15), r(0..10)]);
        assert_eq!(plan.free_formatting, vec![r(0..15)]);
    }

    #[test]
    fn touching_reformats_merge() {
        let plan = normalize(vec![r(5..9), r(0..5), r(9..9), r(20..25)]);
        assert_eq!(plan.free_formatting, vec![r(0..9), r(20..25)]);
    }

    #[test]
    fn empty_leading_whitespace_never_sticks() {
        let plan = normalize(vec![r(0..5), lw(5..5)]);
        assert_eq!(plan.free_formatting, vec![r(0..5), lw(5..5)]);
    }

    #[rstest]
    #[case::same_start(r(0..5), lw(0..8), lw(0..8))]
    #[case::leading_starts_first(lw(0..5), r(2..8), lw(0..8))]
    #[case::leading_starts_later(r(0..5), lw(2..8), r(0..8))]
    #[case::both_leading(lw(0..5), lw(5..8), lw(0..8))]
    fn leading_whitespace_follows_the_start(
        #[case] a: PostponedTask,
        #[case] b: PostponedTask,
        #[case] expected: PostponedTask,
    ) {
        assert_eq!(normalize(vec![a.clone(), b.clone()]).free_formatting, vec![expected.clone()]);
        assert_eq!(normalize(vec![b, a]).free_formatting, vec![expected]);
    }

    fn ordered_and_disjoint(tasks: &[PostponedTask]) -> bool {
        tasks
            .windows(2)
            .all(|pair| pair[0].range.end <= pair[1].range.start)
    }

    fn kind(name: char) -> TaskKind {
        match name {
            'r' => TaskKind::Reformat,
            'l' => TaskKind::ReformatWithLeadingWhitespace,
            _ => TaskKind::Reindent { old_indent: 0 },
        }
    }

    /// Every pair of kinds against every way two ranges can relate.
    #[rstest]
    fn pairwise(
        #[values('r', 'l', 'i')] a: char,
        #[values('r', 'l', 'i')] b: char,
        #[values(
            (0..5, 5..10),
            (0..10, 3..6),
            (0..6, 4..10),
            (0..5, 0..5),
            (0..5, 5..5),
            (5..5, 5..5),
            (0..3, 6..9),
            (0..10, 0..4),
            (0..10, 6..10)
        )]
        ranges: (Range<usize>, Range<usize>),
    ) {
        let (first, second) = ranges;
        let tasks = vec![
            PostponedTask::new(first, kind(a)),
            PostponedTask::new(second, kind(b)),
        ];
        let plan = normalize(tasks.clone());

        assert!(ordered_and_disjoint(&plan.free_formatting), "{plan:?}");
        assert!(ordered_and_disjoint(&plan.reindent), "{plan:?}");
        assert!(plan.free_formatting.iter().all(|task| !task.is_reindent()));
        assert!(plan.deferred.iter().all(|task| !task.is_reindent()));

        // every reindent output is one of the inputs
        for task in &plan.reindent {
            assert!(tasks.contains(task), "{plan:?}");
        }
        // formatting never overlaps a reindent it was split around
        for format in &plan.free_formatting {
            for reindent in &plan.reindent {
                let overlap = format.range.start.max(reindent.range.start)
                    < format.range.end.min(reindent.range.end);
                assert!(!overlap, "{plan:?}");
            }
        }
        // every formatted offset is still covered by something
        for task in tasks.iter().filter(|task| !task.is_reindent()) {
            for offset in task.range.clone() {
                let covered = plan
                    .free_formatting
                    .iter()
                    .chain(&plan.reindent)
                    .chain(&plan.deferred)
                    .any(|out| out.range.contains(&offset));
                assert!(covered, "{offset} lost in {plan:?}");
            }
        }
    }
}
