use std::collections::VecDeque;

use itertools::Itertools;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use tch::{Device, Kind, Tensor};
use tensorboard_rs::summary_writer::SummaryWriter;

/// One committed rollout unit: `num_sequences` states, `num_sequences - 1`
/// actions/dones and one skill entry per state. Owned by the memory, copied
/// out into tensors on sample.
struct StoredSequence {
    states: Vec<Vec<f32>>,
    actions: Vec<Vec<f32>>,
    skills: Vec<u8>,
    dones: Vec<bool>,
}

impl StoredSequence {
    fn transitions(&self) -> usize {
        self.actions.len()
    }
}

/// Batch of sequences with the time axis aligned across the batch.
pub struct SequenceBatch {
    /// (batch, num_sequences - 1, action_dim)
    pub actions_seq: Tensor,
    /// (batch, num_sequences, state_dim)
    pub states_seq: Tensor,
    /// (batch, num_sequences, 1)
    pub skill_seq: Tensor,
}

/// Fixed-capacity sequence store. Transitions accumulate in a working buffer
/// during rollout and are committed as whole fixed-length sequences; partial
/// sequences are never visible to `sample_sequence`.
pub struct SequenceMemory {
    buffer: VecDeque<StoredSequence>,
    capacity: usize,
    num_sequences: usize,
    // in-progress rollout unit
    working_states: Vec<Vec<f32>>,
    working_actions: Vec<Vec<f32>>,
    working_skills: Vec<u8>,
    working_dones: Vec<bool>,
    device: Device,
    rng: SmallRng,
}

impl SequenceMemory {
    /// `capacity` counts stored transitions, not sequences.
    pub fn new(capacity: usize, num_sequences: usize, device: Device, seed: u64) -> Self {
        assert!(
            num_sequences >= 2,
            "a sequence needs at least two states, got num_sequences={num_sequences}"
        );
        Self {
            buffer: VecDeque::new(),
            capacity,
            num_sequences,
            working_states: Vec::with_capacity(num_sequences),
            working_actions: Vec::with_capacity(num_sequences - 1),
            working_skills: Vec::with_capacity(num_sequences),
            working_dones: Vec::with_capacity(num_sequences - 1),
            device,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Begins a new trajectory, dropping any partial in-progress sequence.
    pub fn set_initial_state(&mut self, obs: Vec<f32>) {
        self.working_states.clear();
        self.working_actions.clear();
        self.working_skills.clear();
        self.working_dones.clear();
        self.working_states.push(obs);
    }

    /// Appends one transition to the in-progress sequence. Returns true when
    /// the sequence reached its fixed length and was committed to the store.
    pub fn append(&mut self, action: Vec<f32>, skill: u8, state: Vec<f32>, done: bool) -> bool {
        assert!(
            !self.working_states.is_empty(),
            "append called before set_initial_state"
        );
        if self.working_skills.is_empty() {
            // the initial state adopts the first step's skill
            self.working_skills.push(skill);
        }
        self.working_actions.push(action);
        self.working_skills.push(skill);
        self.working_dones.push(done);
        self.working_states.push(state);

        if self.working_states.len() < self.num_sequences {
            return false;
        }

        self.buffer.push_back(StoredSequence {
            states: std::mem::take(&mut self.working_states),
            actions: std::mem::take(&mut self.working_actions),
            skills: std::mem::take(&mut self.working_skills),
            dones: std::mem::take(&mut self.working_dones),
        });
        while self.stored_transitions() > self.capacity {
            self.buffer.pop_front();
        }
        true
    }

    /// Draws `batch_size` sequences uniformly at random with replacement.
    /// Calling this before any sequence was committed is a programmer error.
    pub fn sample_sequence(&mut self, batch_size: usize) -> SequenceBatch {
        assert!(
            !self.buffer.is_empty(),
            "sample_sequence called on an empty memory"
        );

        let mut actions = Vec::with_capacity(batch_size);
        let mut states = Vec::with_capacity(batch_size);
        let mut skills = Vec::with_capacity(batch_size);
        for _ in 0..batch_size {
            let idx = self.rng.gen_range(0..self.buffer.len());
            let seq = &self.buffer[idx];
            actions.push(Tensor::from_slice2(&seq.actions));
            states.push(Tensor::from_slice2(&seq.states));
            skills.push(Tensor::from_slice(
                &seq.skills.iter().map(|s| *s as f32).collect::<Vec<f32>>(),
            ));
        }

        SequenceBatch {
            actions_seq: Tensor::stack(&actions, 0).to_device(self.device),
            states_seq: Tensor::stack(&states, 0).to_device(self.device),
            skill_seq: Tensor::stack(&skills, 0)
                .unsqueeze(-1)
                .to_kind(Kind::Float)
                .to_device(self.device),
        }
    }

    /// Writes the per-skill stored-transition counts as a histogram summary.
    pub fn skill_histogram(&self, writer: &mut SummaryWriter, step: usize) {
        let counts_by_skill = self
            .buffer
            .iter()
            .flat_map(|seq| seq.skills.iter().skip(1).copied())
            .counts();
        let Some(max_skill) = counts_by_skill.keys().max().copied() else {
            return;
        };
        let counts: Vec<f64> = (0..=max_skill)
            .map(|skill| counts_by_skill.get(&skill).copied().unwrap_or(0) as f64)
            .collect();

        // raw-bucket histogram with boundaries half way between skill ids
        writer.add_histogram_raw(
            "memory/skills",
            -0.5,
            counts.len() as f64 - 0.5,
            counts.iter().sum(),
            counts.iter().enumerate().map(|(i, n)| i as f64 * n).sum(),
            counts
                .iter()
                .enumerate()
                .map(|(i, n)| (i * i) as f64 * n)
                .sum(),
            &(0..counts.len())
                .map(|i| i as f64 + 0.5)
                .collect::<Vec<f64>>(),
            &counts,
            step,
        );
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn stored_transitions(&self) -> usize {
        self.buffer.iter().map(StoredSequence::transitions).sum()
    }

    pub fn num_sequences(&self) -> usize {
        self.num_sequences
    }

    /// Per-transition done flags of the oldest stored sequence, used by tests
    /// to check episode boundaries survive commits.
    #[cfg(test)]
    fn oldest_dones(&self) -> Option<&[bool]> {
        self.buffer.front().map(|seq| seq.dones.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEQ_LEN: usize = 5;

    fn fill_one_sequence(memory: &mut SequenceMemory, skill: u8, done_at: Option<usize>) {
        memory.set_initial_state(vec![0.; 3]);
        for i in 0..SEQ_LEN - 1 {
            let done = done_at == Some(i);
            let committed = memory.append(vec![0.1, -0.1], skill, vec![i as f32; 3], done);
            assert_eq!(committed, i == SEQ_LEN - 2);
        }
    }

    #[test]
    fn append_commits_exactly_at_sequence_length() {
        let mut memory = SequenceMemory::new(1000, SEQ_LEN, Device::Cpu, 0);
        fill_one_sequence(&mut memory, 0, None);
        assert_eq!(memory.len(), 1);
        assert_eq!(memory.stored_transitions(), SEQ_LEN - 1);
    }

    #[test]
    fn capacity_is_never_exceeded_and_oldest_is_evicted() {
        // room for exactly two sequences worth of transitions
        let capacity = 2 * (SEQ_LEN - 1);
        let mut memory = SequenceMemory::new(capacity, SEQ_LEN, Device::Cpu, 0);
        fill_one_sequence(&mut memory, 0, Some(1));
        fill_one_sequence(&mut memory, 1, None);
        fill_one_sequence(&mut memory, 2, None);

        assert_eq!(memory.len(), 2);
        assert!(memory.stored_transitions() <= capacity);
        // the skill-0 sequence (with its done marker) must be the one evicted
        assert_eq!(memory.oldest_dones().unwrap(), &[false; SEQ_LEN - 1]);
    }

    #[test]
    fn sampled_batch_has_aligned_time_axes() {
        let mut memory = SequenceMemory::new(1000, SEQ_LEN, Device::Cpu, 0);
        fill_one_sequence(&mut memory, 0, None);
        fill_one_sequence(&mut memory, 1, None);

        let batch = memory.sample_sequence(7);
        assert_eq!(
            batch.actions_seq.size(),
            vec![7, (SEQ_LEN - 1) as i64, 2]
        );
        assert_eq!(batch.states_seq.size(), vec![7, SEQ_LEN as i64, 3]);
        assert_eq!(batch.skill_seq.size(), vec![7, SEQ_LEN as i64, 1]);
    }

    #[test]
    fn set_initial_state_drops_partial_sequences() {
        let mut memory = SequenceMemory::new(1000, SEQ_LEN, Device::Cpu, 0);
        memory.set_initial_state(vec![0.; 3]);
        memory.append(vec![0., 0.], 0, vec![1.; 3], false);
        // new trajectory before the sequence completed
        fill_one_sequence(&mut memory, 1, None);
        assert_eq!(memory.len(), 1);
    }

    #[test]
    #[should_panic(expected = "empty memory")]
    fn sampling_an_empty_memory_panics() {
        let mut memory = SequenceMemory::new(1000, SEQ_LEN, Device::Cpu, 0);
        memory.sample_sequence(1);
    }

    #[test]
    #[should_panic(expected = "set_initial_state")]
    fn append_without_initial_state_panics() {
        let mut memory = SequenceMemory::new(1000, SEQ_LEN, Device::Cpu, 0);
        memory.append(vec![0., 0.], 0, vec![0.; 3], false);
    }
}
