//! Property-based tests for poll transitions and offline votes
//!
//! Uses proptest to generate random vote sequences and verify the poll
//! invariants hold after every step

use proptest::prelude::*;

use crate::common::*;
use tripsync::shared::poll::Poll;

#[derive(Debug, Clone)]
enum Step {
    Vote { voter: usize, options: Vec<usize> },
    Remove { voter: usize },
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (0..4usize, prop::collection::vec(0..3usize, 1..3))
            .prop_map(|(voter, options)| Step::Vote { voter, options }),
        (0..4usize).prop_map(|voter| Step::Remove { voter }),
    ]
}

fn voter(n: usize) -> String {
    format!("user-{}", n)
}

fn option_ids(options: &[usize]) -> Vec<String> {
    options.iter().map(|o| format!("opt-{}", o + 1)).collect()
}

proptest! {
    #[test]
    fn test_total_votes_stays_consistent(
        allow_multiple in any::<bool>(),
        steps in prop::collection::vec(step(), 0..40),
    ) {
        let mut poll = poll_with_options("poll-1", &["Lake", "Coast", "Hills"], allow_multiple);

        for step in steps {
            let before = poll.clone();
            let result = match &step {
                Step::Vote { voter: v, options } => poll.apply_vote(&voter(*v), &option_ids(options)),
                Step::Remove { voter: v } => poll.remove_vote(&voter(*v)),
            };

            // A rejected transition leaves the poll untouched
            if result.is_err() {
                prop_assert_eq!(&poll, &before);
            }
            prop_assert!(poll.is_consistent());
            for option in &poll.options {
                prop_assert_eq!(option.votes as usize, option.voters.len());
            }
            if !poll.allow_multiple {
                let voters: usize = poll.options.iter().map(|o| o.voters.len()).sum();
                let distinct: std::collections::HashSet<&String> =
                    poll.options.iter().flat_map(|o| o.voters.iter()).collect();
                prop_assert_eq!(voters, distinct.len());
            }
        }
    }

    #[test]
    fn test_single_choice_rejects_several_options(
        options in prop::collection::btree_set(0..3usize, 2..=3),
    ) {
        let mut poll = poll_with_options("poll-1", &["Lake", "Coast", "Hills"], false);
        let options: Vec<usize> = options.into_iter().collect();
        prop_assert!(poll.apply_vote("user-1", &option_ids(&options)).is_err());
        prop_assert_eq!(poll.total_votes, 0);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn test_offline_vote_increments_chosen_option(choice in 0..3usize) {
        let (poll, total_before): (Poll, u32) = tokio_test::block_on(async {
            let client = TestClient::new().await;
            let loaded = client
                .load_poll(poll_with_options("poll-1", &["Lake", "Coast", "Hills"], false))
                .await;
            client.go_offline();

            let result = client
                .state
                .polls
                .vote(TRIP, "poll-1", "bob", &option_ids(&[choice]))
                .await;
            assert!(result.unwrap_err().is_offline());

            client.state.polls.fetch_polls(TRIP).await;
            let poll = client.state.polls.poll(TRIP, "poll-1").await.unwrap();
            (poll, loaded.total_votes)
        });

        prop_assert_eq!(poll.total_votes, total_before + 1);
        prop_assert_eq!(poll.options[choice].votes, 1);
        prop_assert!(poll.is_consistent());
    }
}
