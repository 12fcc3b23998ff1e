use crate::feed::parser::{parse_pub_date, Item};
use crate::storage::{Feed, FeedStore, InsertOutcome, NewPost};

/// What happened to one batch of parsed items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Posts newly stored
    pub inserted: usize,
    /// Items whose insert failed for a reason other than a duplicate URL
    pub failed: usize,
    /// Processing stopped at an item whose URL was already stored
    pub hit_duplicate: bool,
}

/// Stores `items` as posts of `feed`, in document order.
///
/// Feeds are assumed to list newest items first, so the first item whose URL
/// is already stored ends the batch: everything after it is taken to be
/// known too. A feed that reorders or inserts older entries will have those
/// entries skipped until they move ahead of every known item.
///
/// An unparseable `pubDate` stores the post without a publication date.
/// Any other store failure is logged and the next item is tried. Ingestion
/// itself never fails.
pub async fn ingest<S>(store: &S, feed: &Feed, items: &[Item]) -> IngestReport
where
    S: FeedStore + ?Sized,
{
    let mut report = IngestReport::default();

    for item in items {
        let post = new_post(feed.id, item);

        match store.insert_post(&post).await {
            Ok(InsertOutcome::Created) => report.inserted += 1,
            Ok(InsertOutcome::DuplicateUrl) => {
                tracing::debug!(
                    feed_id = feed.id,
                    url = %post.url,
                    "Known post reached, skipping rest of feed"
                );
                report.hit_duplicate = true;
                break;
            }
            Err(e) => {
                tracing::warn!(
                    feed_id = feed.id,
                    url = %post.url,
                    error = %e,
                    "Failed to store post"
                );
                report.failed += 1;
            }
        }
    }

    report
}

fn new_post(feed_id: i64, item: &Item) -> NewPost {
    let published_at = parse_pub_date(&item.pub_date);
    if published_at.is_none() && !item.pub_date.is_empty() {
        tracing::debug!(
            feed_id = feed_id,
            pub_date = %item.pub_date,
            "Unparseable publication date, storing post without one"
        );
    }

    NewPost {
        feed_id,
        title: item.title.clone(),
        url: item.link.clone(),
        description: (!item.description.is_empty()).then(|| item.description.clone()),
        published_at,
    }
}
