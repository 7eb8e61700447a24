use std::collections::BTreeMap;

use crate::model::ExternalLink;
use crate::policy::ArchivePolicy;
use crate::record::{LinkRecord, SavedLinksIndex};

/// Current links split against the previous run's records. Every list is
/// sorted by url.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassifiedLinks {
    /// Referenced now, never recorded before: fetch candidates.
    pub new_links: Vec<ExternalLink>,
    /// Referenced now and recorded before; locations refreshed from `current`.
    pub carried: Vec<LinkRecord>,
    /// Recorded before, no longer referenced.
    pub deleted: Vec<LinkRecord>,
}

impl ClassifiedLinks {
    /// Moves carried records that are not in `index` but whose recorded content
    /// type the policy now archives back into `new_links`.
    pub fn requeue_unsaved(&mut self, index: Option<&SavedLinksIndex>, policy: &ArchivePolicy) {
        let carried = std::mem::take(&mut self.carried);
        let (requeue, keep): (Vec<_>, Vec<_>) = carried
            .into_iter()
            .partition(|record| needs_rerequest(record, index, policy));
        self.carried = keep;
        self.new_links.extend(requeue.iter().map(LinkRecord::link));
        self.new_links.sort_by(|a, b| a.url.cmp(&b.url));
    }
}

#[derive(Default)]
struct Pair {
    link: Option<ExternalLink>,
    record: Option<LinkRecord>,
}

/// Matches `current` links with `previous` records by url.
pub fn classify(current: Vec<ExternalLink>, previous: Vec<LinkRecord>) -> ClassifiedLinks {
    let mut pairs: BTreeMap<String, Pair> = BTreeMap::new();
    for link in current {
        let pair = pairs.entry(link.url.clone()).or_default();
        if let Some(existing) = &mut pair.link {
            existing.locations.extend(link.locations);
            existing.locations.sort();
            existing.locations.dedup();
        } else {
            pair.link = Some(link);
        }
    }
    for record in previous {
        let url = record.url.clone();
        pairs.entry(url).or_default().record = Some(record);
    }

    let mut classified = ClassifiedLinks::default();
    for pair in pairs.into_values() {
        match (pair.link, pair.record) {
            (Some(link), None) => classified.new_links.push(link),
            (Some(link), Some(mut record)) => {
                record.locations = link.locations;
                classified.carried.push(record);
            }
            (None, Some(record)) => classified.deleted.push(record),
            (None, None) => {}
        }
    }
    classified
}

/// Records of an existing run that should be fetched again: not archived yet,
/// but their last response has a content type the policy now archives.
pub fn re_request_targets<'a, I>(
    records: I,
    index: Option<&SavedLinksIndex>,
    policy: &ArchivePolicy,
) -> Vec<ExternalLink>
where
    I: IntoIterator<Item = &'a LinkRecord>,
{
    records
        .into_iter()
        .filter(|record| needs_rerequest(record, index, policy))
        .map(LinkRecord::link)
        .collect()
}

fn needs_rerequest(
    record: &LinkRecord,
    index: Option<&SavedLinksIndex>,
    policy: &ArchivePolicy,
) -> bool {
    let archived = index.is_some_and(|index| index.contains(&record.url));
    !archived && policy.should_archive(record.response.content_type())
}
