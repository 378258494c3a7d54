use std::collections::HashMap;

use uuid::Uuid;

use parlor_types::models::{Poll, PollOption};

use crate::error::{CoreError, CoreResult};

const MAX_OPTIONS: usize = 10;
const MAX_QUESTION_LEN: usize = 200;
const MAX_OPTION_LEN: usize = 100;

#[derive(Debug, Default)]
pub struct PollStore {
    polls: HashMap<Uuid, PollRecord>,
}

#[derive(Debug)]
struct PollRecord {
    poll: Poll,
    /// voter name (lowercased) -> chosen option index. One vote per name.
    voters: HashMap<String, usize>,
}

impl PollStore {
    pub fn create(
        &mut self,
        question: &str,
        options: Vec<String>,
        channel: &str,
    ) -> CoreResult<Poll> {
        let question = question.trim();
        if question.is_empty() {
            return Err(CoreError::Rejected("question must not be empty".into()));
        }
        let options: Vec<String> = options
            .into_iter()
            .map(|o| o.trim().chars().take(MAX_OPTION_LEN).collect::<String>())
            .filter(|o| !o.is_empty())
            .collect();
        if options.len() < 2 || options.len() > MAX_OPTIONS {
            return Err(CoreError::Rejected(format!(
                "polls need 2 to {MAX_OPTIONS} options"
            )));
        }

        let poll = Poll {
            id: Uuid::new_v4(),
            channel: channel.to_string(),
            question: question.chars().take(MAX_QUESTION_LEN).collect(),
            options: options
                .into_iter()
                .map(|text| PollOption { text, votes: 0 })
                .collect(),
        };
        self.polls.insert(
            poll.id,
            PollRecord {
                poll: poll.clone(),
                voters: HashMap::new(),
            },
        );
        Ok(poll)
    }

    pub fn vote(&mut self, poll_id: Uuid, voter: &str, option_index: usize) -> CoreResult<Poll> {
        let record = self
            .polls
            .get_mut(&poll_id)
            .ok_or_else(|| CoreError::NotFound("unknown poll".into()))?;
        if option_index >= record.poll.options.len() {
            return Err(CoreError::Rejected("option index out of range".into()));
        }
        let key = voter.to_lowercase();
        if record.voters.contains_key(&key) {
            return Err(CoreError::Rejected("already voted".into()));
        }
        record.voters.insert(key, option_index);
        record.poll.options[option_index].votes += 1;
        Ok(record.poll.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_validates_question_and_options() {
        let mut store = PollStore::default();
        assert!(store.create("  ", vec!["a".into(), "b".into()], "general").is_err());
        assert!(store.create("q?", vec!["only".into()], "general").is_err());
        // Blank options are dropped before the count check.
        assert!(store
            .create("q?", vec!["a".into(), "   ".into()], "general")
            .is_err());
        let poll = store
            .create("q?", vec!["yes".into(), " no ".into()], "general")
            .unwrap();
        assert_eq!(poll.options[1].text, "no");
    }

    #[test]
    fn one_vote_per_name_case_insensitive() {
        let mut store = PollStore::default();
        let poll = store
            .create("q?", vec!["yes".into(), "no".into()], "general")
            .unwrap();

        let updated = store.vote(poll.id, "Ada", 0).unwrap();
        assert_eq!(updated.options[0].votes, 1);
        assert!(store.vote(poll.id, "ada", 1).is_err());
        assert_eq!(store.vote(poll.id, "grace", 1).unwrap().options[1].votes, 1);
    }

    #[test]
    fn vote_checks_bounds_and_existence() {
        let mut store = PollStore::default();
        let poll = store
            .create("q?", vec!["yes".into(), "no".into()], "general")
            .unwrap();
        assert!(matches!(
            store.vote(poll.id, "ada", 2),
            Err(CoreError::Rejected(_))
        ));
        assert!(matches!(
            store.vote(Uuid::new_v4(), "ada", 0),
            Err(CoreError::NotFound(_))
        ));
    }
}
