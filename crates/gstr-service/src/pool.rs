//! Bounded fan-out for upstream fetches.

use std::future::Future;

use futures::{StreamExt, stream};

/// Run `task` for every item with at most `concurrency` in flight, then
/// return the results sorted by item. Completion order is irrelevant to
/// callers; chronological order is what the reconcilers need.
pub async fn fan_out<I, T, F, Fut>(items: Vec<I>, concurrency: usize, task: F) -> Vec<(I, T)>
where
  I: Ord + Clone,
  F: Fn(I) -> Fut,
  Fut: Future<Output = T>,
{
  let mut out: Vec<(I, T)> = stream::iter(items)
    .map(|item| {
      let fut = task(item.clone());
      async move { (item, fut.await) }
    })
    .buffer_unordered(concurrency.max(1))
    .collect()
    .await;
  out.sort_by(|a, b| a.0.cmp(&b.0));
  out
}

#[cfg(test)]
mod tests {
  use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
  };

  use super::*;

  #[tokio::test]
  async fn results_come_back_sorted() {
    let out = fan_out(vec![3u32, 1, 2], 3, |n| async move {
      tokio::time::sleep(Duration::from_millis(u64::from(n) * 5)).await;
      n * 10
    })
    .await;
    assert_eq!(out, vec![(1, 10), (2, 20), (3, 30)]);
  }

  #[tokio::test]
  async fn never_exceeds_the_bound() {
    let running = AtomicUsize::new(0);
    let peak = AtomicUsize::new(0);
    let (running, peak) = (&running, &peak);
    fan_out((0..20).collect(), 4, |_: i32| async move {
      let now = running.fetch_add(1, Ordering::SeqCst) + 1;
      peak.fetch_max(now, Ordering::SeqCst);
      tokio::time::sleep(Duration::from_millis(2)).await;
      running.fetch_sub(1, Ordering::SeqCst);
    })
    .await;
    assert!(peak.load(Ordering::SeqCst) <= 4);
    assert_eq!(running.load(Ordering::SeqCst), 0);
  }
}
