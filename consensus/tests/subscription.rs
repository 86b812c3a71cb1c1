// Copyright (C) 2015-2021 Vaultos Systems Inc.
// This file is part of the vaultos library.

// The vaultos library is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// The vaultos library is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with the vaultos library. If not, see <https://www.gnu.org/licenses/>.

use std::time::Duration;

use vaultos_consensus::{ChangeId, ConsensusError};
use vaultos_objects::hash::hash_bytes;
use vaultos_testing::TestNode;

#[test]
fn subscriber_sees_every_entry_in_order_exactly_once() {
    let node = TestNode::new().unwrap();
    let mut blocks = vec![node.cs.genesis_id()];
    for _ in 0..4 {
        blocks.push(node.mine_and_accept(vec![]).unwrap().id());
    }

    let mut subscriber = node.cs.subscribe(None).unwrap();
    for expected in &blocks {
        let (_, entry) = subscriber.try_next().unwrap().unwrap();
        assert_eq!(entry.reverted, vec![]);
        assert_eq!(entry.applied, vec![*expected]);
    }
    assert!(subscriber.try_next().unwrap().is_none());

    // Live delivery after the backlog is drained.
    let next = node.mine_and_accept(vec![]).unwrap();
    let (_, entry) = subscriber
        .next_timeout(Duration::from_secs(1))
        .unwrap()
        .unwrap();
    assert_eq!(entry.applied, vec![next.id()]);
}

#[test]
fn subscription_can_resume_from_a_cursor() {
    let node = TestNode::new().unwrap();
    node.mine_empty_blocks(3).unwrap();

    let mut first = node.cs.subscribe(None).unwrap();
    let (_, _genesis) = first.try_next().unwrap().unwrap();
    let (resume_from, _) = first.try_next().unwrap().unwrap();

    // A second subscriber starting after the cursor sees only the rest.
    let mut second = node.cs.subscribe(Some(resume_from)).unwrap();
    let mut delivered = 0;
    while second.try_next().unwrap().is_some() {
        delivered += 1;
    }
    assert_eq!(delivered, 2);
}

#[test]
fn unknown_start_cursor_is_rejected() {
    let node = TestNode::new().unwrap();
    let bogus = ChangeId(hash_bytes(b"nonsense"));
    let err = node.cs.subscribe(Some(bogus)).unwrap_err();
    assert!(matches!(err, ConsensusError::InvalidChangeId));
}
