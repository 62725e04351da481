//! Episode clustering for reflection.
//!
//! Embedding-based greedy clustering when a provider is available, with a
//! time-window bucketing fallback that needs nothing but timestamps.

use crate::error::Result;
use crate::ports::{EmbeddingProvider, cosine_similarity};
use crate::types::Memory;
use std::time::Duration;

/// Indices of memories grouped into one cluster.
pub type Cluster = Vec<usize>;

/// Greedy centroid clustering over content embeddings.
///
/// Each memory joins the first cluster whose centroid similarity meets
/// `threshold`, else starts a new cluster. Order-dependent but
/// deterministic for a fixed input order (the pipeline feeds episodes
/// oldest-first).
pub async fn cluster_by_embedding(
    embedder: &dyn EmbeddingProvider,
    memories: &[Memory],
    threshold: f64,
) -> Result<Vec<Cluster>> {
    let texts: Vec<String> = memories.iter().map(|m| m.content.clone()).collect();
    let embeddings = embedder.embed_batch(&texts).await?;

    let mut clusters: Vec<Cluster> = Vec::new();
    let mut centroids: Vec<Vec<f32>> = Vec::new();

    for (index, embedding) in embeddings.iter().enumerate() {
        let mut assigned = false;
        for (cluster, centroid) in clusters.iter_mut().zip(centroids.iter_mut()) {
            let similarity = f64::from(cosine_similarity(centroid, embedding));
            if similarity >= threshold {
                cluster.push(index);
                update_centroid(centroid, embedding, cluster.len());
                assigned = true;
                break;
            }
        }
        if !assigned {
            clusters.push(vec![index]);
            centroids.push(embedding.clone());
        }
    }
    Ok(clusters)
}

/// Running mean update of a centroid after adding one member.
fn update_centroid(centroid: &mut [f32], added: &[f32], new_len: usize) {
    let n = new_len as f32;
    for (c, a) in centroid.iter_mut().zip(added.iter()) {
        *c += (a - *c) / n;
    }
}

/// Bucket memories into consecutive time windows.
///
/// Memories must be sorted by `created_at` ascending; each bucket spans
/// `window` from its first member.
#[must_use]
pub fn cluster_by_time_window(memories: &[Memory], window: Duration) -> Vec<Cluster> {
    let mut clusters: Vec<Cluster> = Vec::new();
    let window = chrono::Duration::from_std(window).unwrap_or(chrono::Duration::days(1));
    let mut bucket_start = None;

    for (index, memory) in memories.iter().enumerate() {
        match bucket_start {
            Some(start) if memory.created_at - start <= window => {
                if let Some(last) = clusters.last_mut() {
                    last.push(index);
                }
            }
            _ => {
                bucket_start = Some(memory.created_at);
                clusters.push(vec![index]);
            }
        }
    }
    clusters
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MemoryDraft, Scope};
    use chrono::Utc;

    fn memory_at(hours_ago: i64) -> Memory {
        let now = Utc::now();
        let mut memory =
            MemoryDraft::episodic(Scope::new("t1", "p1"), "event").into_memory(now);
        memory.created_at = now - chrono::Duration::hours(hours_ago);
        memory
    }

    #[test]
    fn test_time_window_bucketing() {
        // Oldest first: 50h, 49h, 48h, 2h, 1h ago.
        let memories = vec![
            memory_at(50),
            memory_at(49),
            memory_at(48),
            memory_at(2),
            memory_at(1),
        ];
        let clusters = cluster_by_time_window(&memories, Duration::from_secs(86_400));
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0], vec![0, 1, 2]);
        assert_eq!(clusters[1], vec![3, 4]);
    }

    #[test]
    fn test_time_window_empty_input() {
        assert!(cluster_by_time_window(&[], Duration::from_secs(60)).is_empty());
    }

    #[test]
    fn test_centroid_update_is_running_mean() {
        let mut centroid = vec![1.0, 0.0];
        update_centroid(&mut centroid, &[0.0, 1.0], 2);
        assert!((centroid[0] - 0.5).abs() < 1e-6);
        assert!((centroid[1] - 0.5).abs() < 1e-6);
    }
}
