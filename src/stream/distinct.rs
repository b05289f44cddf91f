//! Suppress repeated stream descriptors

use futures::{Stream, ready};
use pin_project_lite::pin_project;
use std::ops::Deref;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::types::{SriComparator, StreamDescriptor, sri};

/// Extension trait to drop unchanged descriptors from any descriptor stream
pub trait DistinctSriExt: Stream {
    /// Only emit descriptors that differ from the last one emitted.
    ///
    /// Equality is decided by [`sri::equals`].
    fn distinct_sri(self) -> DistinctSri<Self>
    where
        Self: Sized,
        Self::Item: Deref<Target = StreamDescriptor> + Clone,
    {
        DistinctSri::new(self, sri::equals)
    }

    /// Like [`distinct_sri`](DistinctSriExt::distinct_sri) with a custom comparator.
    fn distinct_sri_by(self, comparator: SriComparator) -> DistinctSri<Self>
    where
        Self: Sized,
        Self::Item: Deref<Target = StreamDescriptor> + Clone,
    {
        DistinctSri::new(self, comparator)
    }
}

impl<T: Stream> DistinctSriExt for T {}

pin_project! {
    /// A stream combinator that skips descriptors equal to the previous one
    pub struct DistinctSri<S: Stream> {
        #[pin]
        stream: S,
        comparator: SriComparator,
        last: Option<S::Item>,
    }
}

impl<S> DistinctSri<S>
where
    S: Stream,
    S::Item: Deref<Target = StreamDescriptor> + Clone,
{
    pub fn new(stream: S, comparator: SriComparator) -> Self {
        Self { stream, comparator, last: None }
    }
}

impl<S> Stream for DistinctSri<S>
where
    S: Stream,
    S::Item: Deref<Target = StreamDescriptor> + Clone,
{
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        let comparator = *this.comparator;

        loop {
            let Some(item) = ready!(this.stream.as_mut().poll_next(cx)) else {
                return Poll::Ready(None);
            };

            let unchanged = this
                .last
                .as_ref()
                .is_some_and(|last| comparator(Some(&**last), Some(&*item)));
            if unchanged {
                continue;
            }

            *this.last = Some(item.clone());
            return Poll::Ready(Some(item));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::sync::Arc;

    #[tokio::test]
    async fn skips_consecutive_duplicates() {
        let first = Arc::new(StreamDescriptor::create("rx", 1_000.0, 1, false));
        let changed = Arc::new(first.as_ref().clone().with_keyword("COL_RF", 88.5e6));

        let items = vec![first.clone(), first.clone(), changed.clone(), changed.clone(), first.clone()];
        let seen: Vec<_> = futures::stream::iter(items).distinct_sri().collect().await;

        assert_eq!(seen.len(), 3);
        assert!(sri::equals(Some(seen[0].as_ref()), Some(first.as_ref())));
        assert!(sri::equals(Some(seen[1].as_ref()), Some(changed.as_ref())));
        assert!(sri::equals(Some(seen[2].as_ref()), Some(first.as_ref())));
    }

    #[tokio::test]
    async fn custom_comparator_controls_equality() {
        fn same_stream(a: Option<&StreamDescriptor>, b: Option<&StreamDescriptor>) -> bool {
            matches!((a, b), (Some(a), Some(b)) if a.stream_id == b.stream_id)
        }

        let a = Arc::new(StreamDescriptor::create("rx", 1_000.0, 1, false));
        let b = Arc::new(StreamDescriptor::create("rx", 2_000.0, 1, false));
        let c = Arc::new(StreamDescriptor::create("tx", 2_000.0, 1, false));

        let seen: Vec<_> = futures::stream::iter(vec![a, b, c]).distinct_sri_by(same_stream).collect().await;
        let ids: Vec<_> = seen.iter().map(|descriptor| descriptor.stream_id.as_str()).collect();
        assert_eq!(ids, ["rx", "tx"]);
    }
}
