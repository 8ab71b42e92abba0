/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The driver of the consensus core: consumes inbound block and vote messages, invokes
//! validation, updates the chain store flags, tracks the local highest committed certificate, and
//! proposes and votes according to the per-epoch state machine.
//!
//! # The per-epoch state machine
//!
//! 1. **Propose**: on entering epoch `E`, if the local node is the proposer for `E`, it builds a
//!    candidate on top of [`tip_to_extend`](crate::fork_choice::tip_to_extend), populates the
//!    commit certificate from the local highest committed certificate, signs, and broadcasts.
//! 2. **Vote**: upon the first valid proposal for `E` that becomes the local fork-choice tip, the
//!    node broadcasts a vote. At most one vote is cast per epoch.
//! 3. **Collect**: signature-verified votes are aggregated per `{block, epoch}`; a quorum forms a
//!    certificate.
//! 4. **Advance**: certificates accumulating in the chained pattern (a block whose child and
//!    grandchild are also certified) commit the head of the pattern, move the local highest
//!    committed certificate up, and advance the engine to the next epoch. An epoch that produces
//!    no progress ends by timeout.
//!
//! # Inbound handling
//!
//! Blocks are inserted into the chain store even when their parent is missing (the store
//! tolerates orphans). Validation is attempted immediately and re-attempted whenever one of a
//! block's unsatisfied dependencies transitions: children of a block that just turned valid are
//! re-examined, and blocks whose parent or commit certificate target is unknown trigger sync
//! requests. Rule-violating blocks stay in the store (enabling duplicate detection and
//! equivocation proofs) but are never marked valid, and their sender is penalized.

pub(crate) mod voting;

use std::{
    collections::HashMap,
    sync::{
        mpsc::{Receiver, RecvTimeoutError, Sender, TryRecvError},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use crate::{
    chain::{Chain, ChainError, ExtendedBlock},
    events::{
        CollectCertificateEvent, CommitBlockEvent, Event, InsertBlockEvent, ProposeEvent,
        ReceiveBlockEvent, ReceiveVoteEvent, StartEpochEvent, ValidateBlockEvent, VoteEvent,
    },
    fork_choice::{tip_to_extend, tip_to_vote},
    networking::{messages::ConsensusMessage, messenger::Messenger, sending::SenderHandle},
    sync::SyncManager,
    types::{
        block::{Block, CommitCertificate},
        crypto_primitives::Keypair,
        data_types::{BlockHeight, ChainID, CryptoHash, Epoch, Timestamp, ValidatorAddress},
        voting::{Vote, VoteSet},
    },
    validation::{check_block, update_constraint_window, BlockValidationError},
    validator_manager::ValidatorManager,
};

use self::voting::VoteAggregator;

/// Immutable parameters that define the behaviour of the [`ConsensusEngine`] and should never
/// change while it runs.
#[derive(Clone)]
pub struct EngineConfiguration {
    /// The chain this engine tracks.
    pub chain_id: ChainID,

    /// The keypair with which the engine signs proposals and votes.
    pub keypair: Keypair,

    /// How long the engine waits in an epoch without progress before advancing to the next one.
    pub epoch_time: Duration,
}

/// A single participant in the consensus protocol.
///
/// The engine is meant to be driven in an event-oriented fashion by [`start_engine`], which runs
/// the single-consumer event loop: inbound messages arrive on a channel, and an epoch timer
/// advances the state machine when no progress is made.
pub struct ConsensusEngine<M: Messenger, V: ValidatorManager> {
    config: EngineConfiguration,
    chain: Arc<Chain>,
    validator_manager: Arc<V>,
    sender: SenderHandle<M>,
    sync: SyncManager<M>,
    epoch: Epoch,
    epoch_deadline: Instant,
    highest_epoch_voted: Option<Epoch>,
    aggregator: VoteAggregator,
    certificates: HashMap<CryptoHash, VoteSet>,
    highest_committed: CommitState,
    offenses: HashMap<ValidatorAddress, u32>,
    event_publisher: Option<Sender<Event>>,
}

/// The engine's view of the highest block whose commit it has itself observed. Moves only upward
/// by height.
struct CommitState {
    block: CryptoHash,
    height: BlockHeight,
    votes: Option<VoteSet>,
}

impl<M: Messenger, V: ValidatorManager> ConsensusEngine<M, V> {
    pub(crate) fn new(
        config: EngineConfiguration,
        chain: Arc<Chain>,
        validator_manager: Arc<V>,
        messenger: M,
        sync: SyncManager<M>,
        event_publisher: Option<Sender<Event>>,
    ) -> Self {
        let root = chain.root();
        let epoch_time = config.epoch_time;
        Self {
            config,
            chain,
            validator_manager,
            sender: SenderHandle::new(messenger),
            sync,
            epoch: root.epoch(),
            epoch_deadline: Instant::now() + epoch_time,
            highest_epoch_voted: None,
            aggregator: VoteAggregator::new(),
            certificates: HashMap::new(),
            highest_committed: CommitState {
                block: root.hash(),
                height: root.height(),
                votes: None,
            },
            offenses: HashMap::new(),
            event_publisher,
        }
    }

    /// The address under which this engine proposes and votes.
    pub fn address(&self) -> ValidatorAddress {
        self.config.keypair.address()
    }

    /// The epoch the engine is currently in.
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// Hash and height of the highest block the engine has observed a commit for.
    pub fn highest_committed(&self) -> (CryptoHash, BlockHeight) {
        (self.highest_committed.block, self.highest_committed.height)
    }

    /// Enter `epoch`: reset the epoch timer, forget nothing (votes cast in earlier epochs remain
    /// cast), and propose if the local node is the proposer for `epoch`.
    pub(crate) fn enter_epoch(&mut self, epoch: Epoch) {
        if epoch <= self.epoch {
            return;
        }
        self.epoch = epoch;
        self.epoch_deadline = Instant::now() + self.config.epoch_time;

        Event::StartEpoch(StartEpochEvent {
            timestamp: SystemTime::now(),
            epoch,
        })
        .publish(&self.event_publisher);

        let tip = tip_to_extend(&self.chain, self.highest_committed.height);

        // A proposal's epoch must exceed its parent's; if the tip is already at or past this
        // epoch, this round cannot produce a block on top of it.
        if tip.epoch() >= epoch {
            return;
        }

        let proposer = self.validator_manager.proposer(&tip.hash(), epoch);
        if proposer.address == self.address() {
            self.propose(&tip, epoch);
        }
    }

    /// Construct, self-apply, and broadcast a proposal extending `tip`.
    fn propose(&mut self, tip: &ExtendedBlock, epoch: Epoch) {
        let hcc = match self.select_commit_certificate(tip) {
            Some(hcc) => hcc,
            // The configuration demands vote carriage we do not have; the proposal would be
            // rejected by every honest node, so hold back this round.
            None => return,
        };

        let block = Block::new_signed(
            &self.config.keypair,
            self.config.chain_id,
            tip.height() + 1,
            epoch,
            tip.hash(),
            hcc,
            unix_timestamp(),
        );

        Event::Propose(ProposeEvent {
            timestamp: SystemTime::now(),
            block: block.clone(),
        })
        .publish(&self.event_publisher);

        // Apply the proposal locally through the ordinary inbound path, then gossip it. The
        // messenger may or may not loop broadcasts back; the duplicate insert is tolerated.
        let own_address = self.address();
        self.on_receive_block(own_address, block.clone());
        self.sender.broadcast(&block);
    }

    /// Choose the commit certificate for a proposal on top of `tip`, honoring the positional
    /// constraints that validation will apply. Returns `None` when the configuration requires
    /// carried votes that the engine does not hold.
    fn select_commit_certificate(&self, tip: &ExtendedBlock) -> Option<CommitCertificate> {
        let window = update_constraint_window(&self.chain, tip);
        let update_depth = window.iter().position(|b| b.has_validator_update());

        match update_depth {
            // Unconstrained: reference the local highest committed block if it sits below the
            // tip, otherwise fall back to the tip itself.
            None => {
                if self
                    .chain
                    .is_ancestor(&self.highest_committed.block, &tip.hash())
                {
                    Some(CommitCertificate::new(self.highest_committed.block))
                } else {
                    Some(CommitCertificate::new(tip.hash()))
                }
            }

            // Building directly on the update block: the certificate must name it.
            Some(0) => Some(CommitCertificate::new(tip.hash())),

            // Building on the update block's child: the certificate must name the child and
            // carry the votes that certify it.
            Some(1) => self
                .certificates
                .get(&tip.hash())
                .or_else(|| {
                    (self.highest_committed.block == tip.hash())
                        .then_some(self.highest_committed.votes.as_ref())
                        .flatten()
                })
                .map(|votes| CommitCertificate::with_votes(tip.hash(), votes.clone())),

            // Two generations past the update block: naming the tip is allowed without votes.
            Some(2) => Some(CommitCertificate::new(tip.hash())),

            Some(_) => unreachable!("the ancestor window holds at most three blocks"),
        }
    }

    /// Process an inbound block: insert, attempt validation, cascade to dependants.
    pub(crate) fn on_receive_block(&mut self, origin: ValidatorAddress, block: Block) {
        let hash = block.hash();

        Event::ReceiveBlock(ReceiveBlockEvent {
            timestamp: SystemTime::now(),
            origin,
            block: hash,
        })
        .publish(&self.event_publisher);

        match self.chain.add_block(block) {
            Ok(inserted) => {
                Event::InsertBlock(InsertBlockEvent {
                    timestamp: SystemTime::now(),
                    block: inserted.block().clone(),
                })
                .publish(&self.event_publisher);
            }
            // Re-delivery is common (gossip, loopback broadcast); the block may have become
            // validatable since, so fall through to the validation attempt.
            Err(ChainError::BlockKnown { .. }) => {}
            Err(ChainError::WrongChainID) => {
                self.penalize(origin, "block for foreign chain");
                return;
            }
            Err(_) => return,
        }

        self.try_validate_cascade(hash, Some(origin));
    }

    /// Attempt to validate the block identified by `start`, and on success re-examine its
    /// descendants, whose parent-validity dependency just transitioned.
    fn try_validate_cascade(&mut self, start: CryptoHash, origin: Option<ValidatorAddress>) {
        let mut queue = vec![start];

        while let Some(hash) = queue.pop() {
            let block = match self.chain.find_block(&hash) {
                Some(block) => block,
                None => continue,
            };
            if block.valid() {
                // Already verified; its children were (or will be) examined when it turned valid.
                continue;
            }

            // Resolve dependencies; missing ones are requested from peers and the block stays
            // unvalidated until they arrive.
            let parent = match self.chain.find_block(&block.parent()) {
                Some(parent) => parent,
                None => {
                    // A zero parent reference can never resolve; the block is left to rot.
                    if !block.parent().is_zero() {
                        self.sync.request_block(block.parent());
                        self.request_gap_inventory(&block, origin);
                    }
                    continue;
                }
            };
            let hcc_target = block.block().hcc.block_hash;
            if !hcc_target.is_zero() && !self.chain.contains(&hcc_target) {
                self.sync.request_block(hcc_target);
                continue;
            }
            if !parent.valid() {
                // Deferred: re-examined when the parent is marked valid.
                continue;
            }

            match check_block(
                self.chain.as_ref(),
                self.validator_manager.as_ref(),
                block.block(),
                &parent,
            ) {
                Ok(()) => {
                    let _ = self.chain.mark_block_valid(&hash);
                    Event::ValidateBlock(ValidateBlockEvent {
                        timestamp: SystemTime::now(),
                        block: hash,
                    })
                    .publish(&self.event_publisher);

                    if block.epoch() > self.epoch {
                        // The chain is ahead of our round; catch up without proposing.
                        self.epoch = block.epoch();
                        self.epoch_deadline = Instant::now() + self.config.epoch_time;
                        Event::StartEpoch(StartEpochEvent {
                            timestamp: SystemTime::now(),
                            epoch: self.epoch,
                        })
                        .publish(&self.event_publisher);
                    }

                    self.maybe_vote(&block);

                    // A certificate may have formed while the block was still unverified.
                    if self.certificates.contains_key(&hash) {
                        self.on_certificate(&block);
                    }

                    queue.extend(self.chain.children(&hash).iter());
                }
                Err(violation) => {
                    log::info!("block {} rejected: {:?}", short_hash(&hash), violation);
                    // Only the sender of the directly received block is penalized; cascaded
                    // descendants were delivered earlier by possibly different peers.
                    if hash == start {
                        if let Some(origin) = origin {
                            if !matches!(violation, BlockValidationError::ParentNotValid) {
                                self.penalize(origin, "rule-violating block");
                            }
                        }
                    }
                }
            }
        }
    }

    /// Broadcast a vote for `block` if it is the first valid proposal of the current epoch to
    /// become the local fork-choice tip, and the local node is in its validator set.
    fn maybe_vote(&mut self, block: &ExtendedBlock) {
        if block.epoch() != self.epoch {
            return;
        }
        // Equivocation safety: at most one vote per epoch, ever.
        if self.highest_epoch_voted.is_some_and(|voted| voted >= self.epoch) {
            return;
        }
        if tip_to_vote(&self.chain).hash() != block.hash() {
            return;
        }
        if !self
            .validator_manager
            .validator_set(&block.hash())
            .contains(&self.address())
        {
            return;
        }

        let vote = Vote::new(&self.config.keypair, block.hash(), self.epoch);
        self.highest_epoch_voted = Some(self.epoch);

        Event::Vote(VoteEvent {
            timestamp: SystemTime::now(),
            vote: vote.clone(),
        })
        .publish(&self.event_publisher);

        // Count our own vote locally, then gossip it.
        self.collect_vote(vote.clone());
        self.sender.broadcast(&vote);
    }

    /// Process an inbound vote: verify the signature, aggregate, and materialize a certificate on
    /// quorum.
    pub(crate) fn on_receive_vote(&mut self, origin: ValidatorAddress, vote: Vote) {
        Event::ReceiveVote(ReceiveVoteEvent {
            timestamp: SystemTime::now(),
            origin,
            vote: vote.clone(),
        })
        .publish(&self.event_publisher);

        if !vote.is_correct() {
            self.penalize(origin, "vote with bad signature");
            return;
        }

        self.collect_vote(vote);
    }

    fn collect_vote(&mut self, vote: Vote) {
        let block_hash = vote.block;
        let epoch = vote.epoch;
        let validator_set = self.validator_manager.validator_set(&block_hash);

        if let Some(votes) = self.aggregator.collect(&validator_set, vote) {
            Event::CollectCertificate(CollectCertificateEvent {
                timestamp: SystemTime::now(),
                block: block_hash,
                epoch,
            })
            .publish(&self.event_publisher);

            self.certificates.insert(block_hash, votes);

            match self.chain.find_block(&block_hash) {
                Some(block) if block.valid() => self.on_certificate(&block),
                Some(_) => {}
                // A quorum certified a block we have not seen: fetch it.
                None => self.sync.request_block(block_hash),
            }
        }
    }

    /// React to `block` having a certificate: apply the three-in-a-row commit rule along parent
    /// links.
    fn on_certificate(&mut self, block: &ExtendedBlock) {
        let parent = match self.chain.find_block(&block.parent()) {
            Some(parent) if self.certificates.contains_key(&parent.hash()) => parent,
            _ => return,
        };
        let grandparent = match self.chain.find_block(&parent.parent()) {
            Some(grandparent) if self.certificates.contains_key(&grandparent.hash()) => {
                grandparent
            }
            _ => return,
        };

        self.commit(&grandparent);
    }

    /// Move the local highest committed certificate up to `block` and advance to the next epoch.
    fn commit(&mut self, block: &ExtendedBlock) {
        if block.height() <= self.highest_committed.height {
            return;
        }

        self.highest_committed = CommitState {
            block: block.hash(),
            height: block.height(),
            votes: self.certificates.get(&block.hash()).cloned(),
        };

        Event::CommitBlock(CommitBlockEvent {
            timestamp: SystemTime::now(),
            block: block.hash(),
            height: block.height(),
        })
        .publish(&self.event_publisher);

        self.enter_epoch(self.epoch + 1);
    }

    /// When an inbound block sits more than one height above our best tip, ask its sender what
    /// else it holds.
    fn request_gap_inventory(&mut self, block: &ExtendedBlock, origin: Option<ValidatorAddress>) {
        let origin = match origin {
            Some(origin) if origin != self.address() => origin,
            _ => return,
        };
        let local_tip = tip_to_vote(&self.chain);
        if block.height() > local_tip.height() + 1 {
            self.sync.register_peer(origin);
            self.sync.request_inventory(origin, local_tip.height() + 1);
        }
    }

    fn penalize(&mut self, origin: ValidatorAddress, reason: &str) {
        if origin == self.address() {
            return;
        }
        let offenses = self.offenses.entry(origin).or_insert(0);
        *offenses += 1;
        log::warn!(
            "peer penalized ({}): offense #{}",
            reason,
            offenses
        );
    }

    fn tick(&mut self) {
        if Instant::now() >= self.epoch_deadline {
            self.enter_epoch(self.epoch + 1);
        }
        self.sync.tick();
    }
}

/// Spawn the engine thread: the single consumer of inbound consensus messages.
pub(crate) fn start_engine<M: Messenger, V: ValidatorManager>(
    mut engine: ConsensusEngine<M, V>,
    inbound: Receiver<(ValidatorAddress, ConsensusMessage)>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let root_epoch = engine.chain.root().epoch();
        engine.enter_epoch(root_epoch + 1);

        loop {
            match shutdown_signal.try_recv() {
                Ok(()) => return,
                Err(TryRecvError::Empty) => (),
                Err(TryRecvError::Disconnected) => {
                    panic!("the engine thread's shutdown channel was dropped while it was running")
                }
            }

            match inbound.recv_timeout(Duration::from_millis(10)) {
                Ok((origin, ConsensusMessage::Block(block))) => {
                    engine.on_receive_block(origin, block)
                }
                Ok((origin, ConsensusMessage::Vote(vote))) => engine.on_receive_vote(origin, vote),
                Err(RecvTimeoutError::Timeout) => {}
                // All senders gone means the poller is gone; nothing more will arrive.
                Err(RecvTimeoutError::Disconnected) => return,
            }

            engine.tick();
        }
    })
}

fn unix_timestamp() -> Timestamp {
    Timestamp::new(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time is after the Unix epoch")
            .as_secs(),
    )
}

fn short_hash(hash: &CryptoHash) -> String {
    use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
    STANDARD_NO_PAD.encode(hash.bytes())[0..7].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        networking::{
            loopback::{loopback_network, LoopbackMessenger},
            messages::{Envelope, CHANNEL_SYNC, CHANNEL_VOTES},
        },
        sync::{
            messages::{SyncMessage, SyncRequest},
            SyncConfiguration,
        },
        types::{
            data_types::{Power, SignatureBytes},
            validator_set::ValidatorSet,
        },
        validator_manager::StaticValidatorManager,
    };
    use borsh::BorshDeserialize;
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;
    use std::sync::mpsc;

    const TEST_CHAIN: ChainID = ChainID::new(9);

    struct Harness {
        engine: ConsensusEngine<LoopbackMessenger, StaticValidatorManager>,
        peer: LoopbackMessenger,
        peer_keypair: Keypair,
        chain: Arc<Chain>,
        validator_manager: Arc<StaticValidatorManager>,
    }

    fn harness() -> Harness {
        let engine_keypair = Keypair::new(SigningKey::generate(&mut OsRng));
        let peer_keypair = Keypair::new(SigningKey::generate(&mut OsRng));

        let mut set = ValidatorSet::new();
        set.put(&engine_keypair.address(), Power::new(1));
        set.put(&peer_keypair.address(), Power::new(1));
        let validator_manager = Arc::new(StaticValidatorManager::new(set));

        let genesis = Block {
            chain_id: TEST_CHAIN,
            height: BlockHeight::new(0),
            epoch: Epoch::init(),
            parent: CryptoHash::zero(),
            hcc: CommitCertificate::new(CryptoHash::zero()),
            proposer: ValidatorAddress::zero(),
            timestamp: Timestamp::new(1),
            signature: SignatureBytes::zero(),
        };
        let chain = Arc::new(Chain::new(TEST_CHAIN, genesis));

        let mut messengers =
            loopback_network(vec![engine_keypair.address(), peer_keypair.address()]);
        let peer = messengers.remove(1);
        let messenger = messengers.remove(0);

        let (to_engine, _engine_feedback) = mpsc::channel();
        let (_responses_sender, responses) = mpsc::channel();
        let mut sync = SyncManager::new(
            SyncConfiguration {
                chain_id: TEST_CHAIN,
                ..SyncConfiguration::default()
            },
            chain.clone(),
            SenderHandle::new(messenger.clone()),
            responses,
            to_engine,
            None,
        );
        sync.register_peer(peer_keypair.address());

        let engine = ConsensusEngine::new(
            EngineConfiguration {
                chain_id: TEST_CHAIN,
                keypair: engine_keypair,
                epoch_time: Duration::from_secs(60),
            },
            chain.clone(),
            validator_manager.clone(),
            messenger,
            sync,
            None,
        );

        Harness {
            engine,
            peer,
            peer_keypair,
            chain,
            validator_manager,
        }
    }

    /// A block for `epoch` extending `parent`, signed by whichever harness validator is the
    /// assigned proposer.
    fn block_by_proposer(h: &Harness, parent: &ExtendedBlock, epoch: u64, hcc: CryptoHash) -> Block {
        let epoch = Epoch::new(epoch);
        let assigned = h
            .validator_manager
            .proposer(&parent.hash(), epoch)
            .address;
        let keypair = if assigned == h.engine.address() {
            &h.engine.config.keypair
        } else {
            &h.peer_keypair
        };
        Block::new_signed(
            keypair,
            TEST_CHAIN,
            parent.height() + 1,
            epoch,
            parent.hash(),
            CommitCertificate::new(hcc),
            Timestamp::new(100 + epoch.int()),
        )
    }

    fn drain(peer: &mut LoopbackMessenger) -> Vec<Envelope> {
        let mut envelopes = Vec::new();
        // The loopback pool delivers asynchronously; give fan-out tasks a moment to land.
        for _ in 0..50 {
            while let Some((_, envelope)) = peer.recv() {
                envelopes.push(envelope);
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        envelopes
    }

    #[test]
    fn valid_proposals_are_voted_on_and_three_certificates_commit() {
        let mut h = harness();
        let peer_address = h.peer_keypair.address();

        let mut parents = vec![h.chain.root()];
        for epoch in 1..=3u64 {
            let parent = parents.last().unwrap().clone();
            let hcc = parent.hash();
            let block = block_by_proposer(&h, &parent, epoch, hcc);
            let block_hash = block.hash();

            h.engine.on_receive_block(peer_address, block.clone());
            let stored = h.chain.find_block(&block_hash).unwrap();
            assert!(stored.valid(), "epoch {} block should validate", epoch);
            assert_eq!(h.engine.epoch(), Epoch::new(epoch));

            // The engine voted (and counted its own vote); the peer's vote completes the quorum.
            h.engine.on_receive_vote(
                peer_address,
                Vote::new(&h.peer_keypair, block_hash, Epoch::new(epoch)),
            );

            parents.push(stored);
        }

        // Certificates exist for blocks at heights 1..=3: the three-in-a-row rule commits the
        // block at height 1 and advances the epoch.
        let (committed, height) = h.engine.highest_committed();
        assert_eq!(committed, parents[1].hash());
        assert_eq!(height, BlockHeight::new(1));
        assert_eq!(h.engine.epoch(), Epoch::new(4));
    }

    #[test]
    fn at_most_one_vote_per_epoch() {
        let mut h = harness();
        let peer_address = h.peer_keypair.address();
        let root = h.chain.root();

        let first = block_by_proposer(&h, &root, 1, root.hash());
        h.engine.on_receive_block(peer_address, first.clone());

        // A competing proposal for the same epoch; admissible, but the engine has already voted.
        let mut second = first.clone();
        second.timestamp = Timestamp::new(999);
        let assigned = h
            .validator_manager
            .proposer(&root.hash(), Epoch::new(1))
            .address;
        let keypair = if assigned == h.engine.address() {
            &h.engine.config.keypair
        } else {
            &h.peer_keypair
        };
        second.signature = keypair.sign(&second.sign_bytes());
        h.engine.on_receive_block(peer_address, second);

        let votes = drain(&mut h.peer)
            .into_iter()
            .filter(|envelope| envelope.channel_id == CHANNEL_VOTES)
            .count();
        assert_eq!(votes, 1, "the engine must vote at most once per epoch");
    }

    #[test]
    fn rule_violating_blocks_are_stored_but_never_marked_valid() {
        let mut h = harness();
        let peer_address = h.peer_keypair.address();
        let root = h.chain.root();

        // Correctly signed, but by a key that is not the assigned proposer for this epoch.
        let assigned = h
            .validator_manager
            .proposer(&root.hash(), Epoch::new(1))
            .address;
        let wrong_keypair = if assigned == h.engine.address() {
            &h.peer_keypair
        } else {
            &h.engine.config.keypair
        };
        let block = Block::new_signed(
            wrong_keypair,
            TEST_CHAIN,
            BlockHeight::new(1),
            Epoch::new(1),
            root.hash(),
            CommitCertificate::new(root.hash()),
            Timestamp::new(5),
        );
        let hash = block.hash();

        h.engine.on_receive_block(peer_address, block);

        let stored = h.chain.find_block(&hash).expect("stored for equivocation proofs");
        assert!(!stored.valid());
    }

    #[test]
    fn orphans_trigger_sync_and_validate_once_the_parent_arrives() {
        let mut h = harness();
        let peer_address = h.peer_keypair.address();
        let root = h.chain.root();

        // Build the branch on a scratch store, so the harness chain never sees b1 in advance.
        let scratch = Chain::new(TEST_CHAIN, root.block().clone());
        let b1 = block_by_proposer(&h, &root, 1, root.hash());
        let eb1 = scratch.add_block(b1.clone()).unwrap();
        let b2 = block_by_proposer(&h, &eb1, 2, eb1.hash());

        h.engine.on_receive_block(peer_address, b2.clone());

        // The orphan is stored, unvalidated, and its parent was requested from the peer.
        assert!(h.chain.contains(&b2.hash()));
        assert!(!h.chain.find_block(&b2.hash()).unwrap().valid());
        let requested: Vec<CryptoHash> = drain(&mut h.peer)
            .into_iter()
            .filter(|envelope| envelope.channel_id == CHANNEL_SYNC)
            .filter_map(|envelope| SyncMessage::try_from_slice(&envelope.content).ok())
            .filter_map(|msg| match msg {
                SyncMessage::Request(SyncRequest::Block(request)) => Some(request.block),
                _ => None,
            })
            .collect();
        assert!(requested.contains(&eb1.hash()));

        // The parent arrives; the orphan's validation cascades.
        h.engine.on_receive_block(peer_address, b1);
        assert!(h.chain.find_block(&eb1.hash()).unwrap().valid());
        assert!(h.chain.find_block(&b2.hash()).unwrap().valid());
    }
}
