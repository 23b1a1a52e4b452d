//! Masking plans.
//!
//! `masking_configs` entries carry parameter lists; [`expand_masking_configs`]
//! turns them into concrete [`MaskingPlan`]s (one child run each). A plan masks
//! every video with its own RNG, seeded from the plan seed and the video id, so
//! the same plan always masks the same clips regardless of run order.

use crate::config::MaskingConfig;
use crate::model::{CaptionedVideo, MaskedVideo};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum MaskingScheme {
    Partition {
        num_partitions: usize,
        num_parts_to_mask: usize,
    },
    Contiguous {
        width: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskingPlan {
    pub name: String,
    #[serde(flatten)]
    pub scheme: MaskingScheme,
    pub seed: u64,
}

/// Expand config entries in order. Partition plans are seeded with the batch
/// master seed; contiguous plans iterate widths (outer) × seeds (inner).
pub fn expand_masking_configs(configs: &[MaskingConfig], master_seed: u64) -> Vec<MaskingPlan> {
    let mut plans = Vec::new();
    for cfg in configs {
        match cfg {
            MaskingConfig::Partition {
                num_partitions,
                num_parts_to_mask,
            } => {
                for k in num_parts_to_mask {
                    plans.push(MaskingPlan {
                        name: format!("partition_p{}_k{}", num_partitions, k),
                        scheme: MaskingScheme::Partition {
                            num_partitions: *num_partitions,
                            num_parts_to_mask: *k,
                        },
                        seed: master_seed,
                    });
                }
            }
            MaskingConfig::Contiguous { width, seed } => {
                for w in width {
                    for s in seed {
                        plans.push(MaskingPlan {
                            name: format!("contiguous_w{}_s{}", w, s),
                            scheme: MaskingScheme::Contiguous { width: *w },
                            seed: *s,
                        });
                    }
                }
            }
        }
    }
    plans
}

/// Per-video seed: first 8 bytes of sha256(seed || video_id).
pub fn derive_seed(seed: u64, video_id: &str) -> u64 {
    let mut h = Sha256::new();
    h.update(seed.to_le_bytes());
    h.update(video_id.as_bytes());
    let digest = h.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

/// Group boundaries for `n` clips cut into `p` partitions: `floor(i*n/p)`.
pub fn partition_bounds(n: usize, p: usize) -> Vec<(usize, usize)> {
    (0..p).map(|i| (i * n / p, (i + 1) * n / p)).collect()
}

impl MaskingPlan {
    /// Indices to mask for a video of `n` clips, or `None` when the plan
    /// cannot leave at least one clip on each side of the mask.
    pub fn select_indices(&self, n: usize, rng: &mut StdRng) -> Option<Vec<usize>> {
        match self.scheme {
            MaskingScheme::Partition {
                num_partitions: p,
                num_parts_to_mask: k,
            } => {
                if n < p || k == 0 || k >= p {
                    return None;
                }
                let bounds = partition_bounds(n, p);
                let mut groups = rand::seq::index::sample(rng, p, k).into_vec();
                groups.sort_unstable();
                Some(
                    groups
                        .into_iter()
                        .flat_map(|g| bounds[g].0..bounds[g].1)
                        .collect(),
                )
            }
            MaskingScheme::Contiguous { width } => {
                if width == 0 || width >= n {
                    return None;
                }
                let start = rng.gen_range(0..=n - width);
                Some((start..start + width).collect())
            }
        }
    }

    pub fn mask_video(&self, video: &CaptionedVideo) -> Option<MaskedVideo> {
        let mut rng = StdRng::seed_from_u64(derive_seed(self.seed, &video.video_id));
        let indices = self.select_indices(video.clips.len(), &mut rng)?;
        Some(apply_mask(video, indices))
    }

    /// Params logged on the child run, prefixed with `masking.`.
    pub fn params(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        out.insert("masking.name".to_string(), self.name.clone());
        out.insert("masking.seed".to_string(), self.seed.to_string());
        match self.scheme {
            MaskingScheme::Partition {
                num_partitions,
                num_parts_to_mask,
            } => {
                out.insert("masking.scheme".to_string(), "partition".to_string());
                out.insert(
                    "masking.num_partitions".to_string(),
                    num_partitions.to_string(),
                );
                out.insert(
                    "masking.num_parts_to_mask".to_string(),
                    num_parts_to_mask.to_string(),
                );
            }
            MaskingScheme::Contiguous { width } => {
                out.insert("masking.scheme".to_string(), "contiguous".to_string());
                out.insert("masking.width".to_string(), width.to_string());
            }
        }
        out
    }
}

/// Copy `video`, replacing the data at `indices` with the missing marker.
pub fn apply_mask(video: &CaptionedVideo, mut indices: Vec<usize>) -> MaskedVideo {
    indices.sort_unstable();
    indices.dedup();
    indices.retain(|i| *i < video.clips.len());

    let mut masked = video.clone();
    for &i in &indices {
        masked.clips[i] = masked.clips[i].masked();
    }
    MaskedVideo {
        video: masked,
        masked_indices: indices,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CaptionedClip;

    fn video(id: &str, n: usize) -> CaptionedVideo {
        CaptionedVideo {
            video_id: id.into(),
            clips: (0..n)
                .map(|i| CaptionedClip::new((i + 1) as f64, format!("c{i}")))
                .collect(),
        }
    }

    fn partition(p: usize, k: usize) -> MaskingPlan {
        MaskingPlan {
            name: format!("partition_p{p}_k{k}"),
            scheme: MaskingScheme::Partition {
                num_partitions: p,
                num_parts_to_mask: k,
            },
            seed: 42,
        }
    }

    fn contiguous(width: usize, seed: u64) -> MaskingPlan {
        MaskingPlan {
            name: format!("contiguous_w{width}_s{seed}"),
            scheme: MaskingScheme::Contiguous { width },
            seed,
        }
    }

    #[test]
    fn expansion_counts_and_names() {
        let plans = expand_masking_configs(
            &[
                MaskingConfig::Partition {
                    num_partitions: 5,
                    num_parts_to_mask: vec![1, 2, 3, 4],
                },
                MaskingConfig::Contiguous {
                    width: vec![1, 3],
                    seed: vec![7, 8, 9],
                },
            ],
            42,
        );
        assert_eq!(plans.len(), 4 + 2 * 3);
        assert_eq!(plans[0].name, "partition_p5_k1");
        assert_eq!(plans[0].seed, 42);
        assert_eq!(plans[4].name, "contiguous_w1_s7");
        assert_eq!(plans[5].name, "contiguous_w1_s8");
        assert_eq!(plans[9].name, "contiguous_w3_s9");
        assert_eq!(plans[9].seed, 9);
    }

    #[test]
    fn partition_bounds_cover_all_clips() {
        assert_eq!(
            partition_bounds(7, 3),
            vec![(0, 2), (2, 4), (4, 7)]
        );
        let b = partition_bounds(10, 5);
        assert_eq!(b.first(), Some(&(0, 2)));
        assert_eq!(b.last(), Some(&(8, 10)));
    }

    #[test]
    fn same_seed_same_mask() {
        let v = video("vid-a", 12);
        let plan = partition(4, 2);
        assert_eq!(plan.mask_video(&v), plan.mask_video(&v));

        let c = contiguous(3, 7);
        assert_eq!(c.mask_video(&v), c.mask_video(&v));
    }

    #[test]
    fn partition_masks_whole_groups() {
        let v = video("vid-b", 10);
        let plan = partition(5, 2);
        let masked = plan.mask_video(&v).unwrap();
        assert_eq!(masked.video.clips.len(), 10);
        assert_eq!(masked.masked_indices.len(), 4);

        let bounds = partition_bounds(10, 5);
        let covered: Vec<usize> = bounds
            .iter()
            .filter(|(s, _)| masked.masked_indices.contains(s))
            .flat_map(|(s, e)| *s..*e)
            .collect();
        assert_eq!(covered, masked.masked_indices);
    }

    #[test]
    fn contiguous_masks_consecutive_run() {
        let v = video("vid-c", 8);
        for seed in 0..20 {
            let masked = contiguous(3, seed).mask_video(&v).unwrap();
            let idx = &masked.masked_indices;
            assert_eq!(idx.len(), 3);
            assert_eq!(idx[2] - idx[0], 2);
            for (i, clip) in masked.video.clips.iter().enumerate() {
                assert_eq!(clip.timestamp, v.clips[i].timestamp);
                assert_eq!(clip.data.is_missing(), idx.contains(&i));
            }
        }
    }

    #[test]
    fn short_videos_are_not_masked() {
        assert!(partition(5, 1).mask_video(&video("short", 4)).is_none());
        assert!(contiguous(3, 1).mask_video(&video("short", 3)).is_none());
        assert!(contiguous(3, 1).mask_video(&video("ok", 4)).is_some());
    }

    #[test]
    fn masks_depend_on_video_id() {
        let plan = contiguous(1, 5);
        let picks: std::collections::HashSet<Vec<usize>> = (0..16)
            .map(|i| {
                plan.mask_video(&video(&format!("v{i}"), 20))
                    .unwrap()
                    .masked_indices
            })
            .collect();
        assert!(picks.len() > 1, "different videos should get different masks");
    }

    #[test]
    fn apply_mask_sorts_and_dedups() {
        let masked = apply_mask(&video("v", 5), vec![3, 1, 3, 9]);
        assert_eq!(masked.masked_indices, vec![1, 3]);
    }

    #[test]
    fn params_are_prefixed() {
        let p = partition(5, 2).params();
        assert_eq!(p["masking.scheme"], "partition");
        assert_eq!(p["masking.num_parts_to_mask"], "2");
        assert_eq!(contiguous(2, 3).params()["masking.width"], "2");
    }
}
