//! Page blending: interleave the prioritized and discovery pools under
//! diversity constraints.

use std::collections::HashMap;

use crate::catalog::{ImageRecord, SortKey};

/// Walk both candidate pools and assemble one page.
///
/// The prioritized pool is preferred until `prioritized_target` items have
/// been taken from it, then discovery is preferred; whenever the preferred
/// pool has no eligible candidate the other pool fills in. Candidates whose
/// uploader is capped are skipped in place, not dropped, so they stay
/// available once the constraint clears. Returns the page plus the sort key
/// of the last prioritized item emitted, which seeds the next cursor.
pub(crate) fn blend_feed(
    mut prioritized: Vec<ImageRecord>,
    mut global_new: Vec<ImageRecord>,
    per_page: usize,
    prioritized_target: usize,
    max_per_uploader: usize,
    max_consecutive: usize,
) -> (Vec<ImageRecord>, Option<SortKey>) {
    let mut output: Vec<ImageRecord> = Vec::with_capacity(per_page);
    let mut per_uploader_counts: HashMap<i64, usize> = HashMap::new();
    let mut last_uploader: Option<i64> = None;
    let mut consecutive = 0usize;
    let mut prioritized_taken = 0usize;
    let mut last_prioritized: Option<SortKey> = None;

    while output.len() < per_page && (!prioritized.is_empty() || !global_new.is_empty()) {
        let constraints = Constraints {
            per_uploader_counts: &per_uploader_counts,
            last_uploader,
            consecutive,
            max_per_uploader,
            max_consecutive,
        };

        let mut picked_from_prioritized = false;
        let selected = if prioritized_taken < prioritized_target {
            match pop_next_valid(&mut prioritized, &constraints) {
                Some(image) => {
                    picked_from_prioritized = true;
                    Some(image)
                }
                None => pop_next_valid(&mut global_new, &constraints),
            }
        } else {
            match pop_next_valid(&mut global_new, &constraints) {
                Some(image) => Some(image),
                None => {
                    let fallback = pop_next_valid(&mut prioritized, &constraints);
                    if fallback.is_some() {
                        picked_from_prioritized = true;
                    }
                    fallback
                }
            }
        };

        let Some(image) = selected else {
            // Both pools still hold items, but none are eligible this slot.
            break;
        };

        let uploader = image.user_id;
        *per_uploader_counts.entry(uploader).or_insert(0) += 1;
        if last_uploader == Some(uploader) {
            consecutive += 1;
        } else {
            last_uploader = Some(uploader);
            consecutive = 1;
        }
        if picked_from_prioritized {
            prioritized_taken += 1;
            last_prioritized = Some(image.sort_key());
        }
        output.push(image);
    }

    (output, last_prioritized)
}

struct Constraints<'a> {
    per_uploader_counts: &'a HashMap<i64, usize>,
    last_uploader: Option<i64>,
    consecutive: usize,
    max_per_uploader: usize,
    max_consecutive: usize,
}

/// Remove and return the first pool entry that passes the diversity caps.
/// A cap of zero means unconstrained.
fn pop_next_valid(pool: &mut Vec<ImageRecord>, constraints: &Constraints) -> Option<ImageRecord> {
    let position = pool.iter().position(|image| {
        let count = constraints
            .per_uploader_counts
            .get(&image.user_id)
            .copied()
            .unwrap_or(0);
        if constraints.max_per_uploader > 0 && count >= constraints.max_per_uploader {
            return false;
        }
        if constraints.max_consecutive > 0
            && constraints.last_uploader == Some(image.user_id)
            && constraints.consecutive >= constraints.max_consecutive
        {
            return false;
        }
        true
    })?;
    Some(pool.remove(position))
}
