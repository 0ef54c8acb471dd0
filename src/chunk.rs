use crate::command::ScriptTemplate;
use crate::error::{CopyError, Result};

/// One fragment delivery: write `payload` to `destination_path` remotely
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadJob {
    pub destination_path: String,
    pub payload: Vec<u8>,
    pub sequence_index: usize,
}

impl UploadJob {
    pub fn payload_str(&self) -> Result<&str> {
        std::str::from_utf8(&self.payload).map_err(|e| {
            CopyError::Encoding(format!("chunk {} is not text: {}", self.sequence_index, e))
        })
    }
}

/// Ordered jobs for one payload; indices are `0..len()` with no gaps
#[derive(Debug, Clone, Default)]
pub struct ChunkPlan {
    jobs: Vec<UploadJob>,
}

impl ChunkPlan {
    /// Split `payload` so each write command stays strictly below `ceiling`.
    ///
    /// The capacity of chunk `i` is computed from its own fragment path,
    /// since longer indices leave less room for data.
    pub fn split(payload: &[u8], template: &ScriptTemplate, ceiling: usize) -> Result<Self> {
        let mut jobs = Vec::new();
        let mut offset = 0usize;

        while offset < payload.len() {
            let index = jobs.len();
            let path = template.fragment_path(index);
            let overhead = template.write_overhead(&path);
            // strictly under the ceiling
            let capacity = ceiling.saturating_sub(overhead + 1);
            if capacity == 0 {
                return Err(CopyError::Config(format!(
                    "command length ceiling {} leaves no room for data (fragment {} needs {} bytes of overhead)",
                    ceiling, index, overhead
                )));
            }

            let end = (offset + capacity).min(payload.len());
            jobs.push(UploadJob {
                destination_path: path,
                payload: payload[offset..end].to_vec(),
                sequence_index: index,
            });
            offset = end;
        }

        Ok(ChunkPlan { jobs })
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn jobs(&self) -> &[UploadJob] {
        &self.jobs
    }

    pub fn into_jobs(self) -> Vec<UploadJob> {
        self.jobs
    }

    /// Concatenation of all chunk payloads in index order.
    pub fn reassemble(&self) -> Vec<u8> {
        let mut ordered: Vec<&UploadJob> = self.jobs.iter().collect();
        ordered.sort_by_key(|j| j.sequence_index);
        ordered
            .into_iter()
            .flat_map(|j| j.payload.iter().copied())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::{Encoder, TarBase64Encoder};
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use std::io::{Cursor, Read};

    fn template() -> ScriptTemplate {
        ScriptTemplate::new("/tmp", "0123456789abcdef0123456789abcdef")
    }

    #[test]
    fn test_empty_payload_has_no_chunks() {
        let plan = ChunkPlan::split(b"", &template(), 7500).unwrap();
        assert!(plan.is_empty());
        assert!(plan.reassemble().is_empty());
    }

    #[test]
    fn test_every_command_stays_under_ceiling() {
        let t = template();
        let payload = vec![b'A'; 40_000];
        for ceiling in [120usize, 257, 1000, 7500] {
            let plan = ChunkPlan::split(&payload, &t, ceiling).unwrap();
            for job in plan.jobs() {
                let cmd = t.write_chunk(&job.destination_path, job.payload_str().unwrap());
                assert!(cmd.len() < ceiling, "{} >= {}", cmd.len(), ceiling);
                assert!(!job.payload.is_empty());
            }
        }
    }

    #[test]
    fn test_indices_contiguous_and_paths_distinct() {
        let t = template();
        let plan = ChunkPlan::split(&vec![b'z'; 5000], &t, 150).unwrap();
        assert!(plan.len() > 10);
        for (i, job) in plan.jobs().iter().enumerate() {
            assert_eq!(job.sequence_index, i);
            assert_eq!(job.destination_path, t.fragment_path(i));
        }
    }

    #[test]
    fn test_two_chunk_scenario() {
        let t = template();
        let ceiling = 200;
        let first_cap = ceiling - t.write_overhead(&t.fragment_path(0)) - 1;
        // Longer than the ceiling, shorter than two chunks
        let len = ceiling + 10;
        assert!(len < 2 * first_cap);
        let payload: Vec<u8> = (0..len).map(|i| b'a' + (i % 26) as u8).collect();

        let plan = ChunkPlan::split(&payload, &t, ceiling).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.jobs()[0].payload.len(), first_cap);
        assert_eq!(plan.reassemble(), payload);
    }

    #[test]
    fn test_ceiling_too_small() {
        let t = template();
        let overhead = t.write_overhead(&t.fragment_path(0));
        let err = ChunkPlan::split(b"abc", &t, overhead + 1).unwrap_err();
        assert!(matches!(err, CopyError::Config(_)));
    }

    #[test]
    fn test_round_trip_through_encoder() {
        let data: Vec<u8> = (0..20_000u32).map(|i| (i * 7 % 256) as u8).collect();
        let enc = TarBase64Encoder::new("blob");
        let encoded = enc.encode(&mut Cursor::new(data.clone())).unwrap();
        let plan = ChunkPlan::split(&encoded.payload, &template(), 512).unwrap();

        let mut jobs = plan.clone().into_jobs();
        jobs.reverse();
        let shuffled = ChunkPlan { jobs };
        assert_eq!(shuffled.reassemble(), encoded.payload);

        let raw = STANDARD.decode(shuffled.reassemble()).unwrap();
        let mut archive = tar::Archive::new(Cursor::new(raw));
        let mut entry = archive.entries().unwrap().next().unwrap().unwrap();
        let mut restored = Vec::new();
        entry.read_to_end(&mut restored).unwrap();
        assert_eq!(restored, data);
    }
}
