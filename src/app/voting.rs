use crate::domain::vote::{VoteDirection, VoteTally};

/// Tallies and the voter's standing vote after casting `cast`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteOutcome {
    pub tally: VoteTally,
    pub vote: Option<VoteDirection>,
}

/// Apply one vote to the locally known tallies.
///
/// A fresh vote counts once. Repeating the standing direction retracts it.
/// Switching moves one count from the old direction to the new one.
/// Counters never drop below zero.
pub fn cast_vote(
    tally: VoteTally,
    previous: Option<VoteDirection>,
    cast: VoteDirection,
) -> VoteOutcome {
    let mut tally = tally;
    let vote = match previous {
        None => {
            bump(&mut tally, cast, 1);
            Some(cast)
        }
        Some(previous) if previous == cast => {
            bump(&mut tally, cast, -1);
            None
        }
        Some(previous) => {
            bump(&mut tally, previous, -1);
            bump(&mut tally, cast, 1);
            Some(cast)
        }
    };
    VoteOutcome { tally, vote }
}

fn bump(tally: &mut VoteTally, direction: VoteDirection, delta: i32) {
    let counter = match direction {
        VoteDirection::Like => &mut tally.likes,
        VoteDirection::Dislike => &mut tally.dislikes,
    };
    *counter = (*counter + delta).max(0);
}
