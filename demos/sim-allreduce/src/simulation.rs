// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Drive a ring of participants through a collective.

use std::rc::Rc;

use indicatif::ProgressBar;
use tern_collectives::algorithm::CollectiveAlgorithm;
use tern_collectives::completion::{CompletionReceiver, completion_channel};
use tern_collectives::topology::{RingDimension, RingTopology};
use tern_collectives::types::AlgorithmEvent;
use tern_engine::engine::{Delivery, Engine};
use tern_engine::sim_error;
use tern_engine::types::{SimError, SimResult};
use tern_track::entity::Entity;
use tern_track::{Tracker, debug, error, info, trace};

use crate::config::Settings;
use crate::session::{Outgoing, SimSession};

/// All participants use the same tag for the collective's traffic.
const STREAM_ID: u64 = 1;
const QUEUE_ID: usize = 0;

/// Events moved around by the engine.
#[derive(Debug)]
pub enum SimEvent {
    Algorithm(AlgorithmEvent),

    /// Data sent by `src` reaches the target.
    Arrival { src: usize, tag: u64, size: u64 },
}

pub struct Participant {
    entity: Rc<Entity>,
    algorithm: CollectiveAlgorithm,
    session: SimSession,
    finish_tick: Option<u64>,
}

impl Participant {
    #[must_use]
    pub fn algorithm(&self) -> &CollectiveAlgorithm {
        &self.algorithm
    }

    #[must_use]
    pub fn session(&self) -> &SimSession {
        &self.session
    }

    /// Tick at which the participant released its session.
    #[must_use]
    pub fn finish_tick(&self) -> Option<u64> {
        self.finish_tick
    }
}

/// What each participant did.
#[derive(Clone, Debug, PartialEq)]
pub struct ParticipantReport {
    pub id: usize,
    pub exchanges: usize,
    pub bytes_sent: u64,
    pub finish_tick: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Report {
    pub participants: Vec<ParticipantReport>,

    /// Tick at which the last participant finished.
    pub finish_tick: u64,
    pub time_ns: f64,
}

/// State the event handler needs alongside the engine.
struct Ring {
    participants: Vec<Participant>,
    completions: CompletionReceiver,
    bundle_delay_ticks: u64,
    link_latency_ticks: u64,
    num_finished: usize,
    progress: Option<ProgressBar>,
}

pub struct Simulation {
    engine: Engine<SimEvent>,
    entity: Rc<Entity>,
    ring: Ring,
    finish_tick: u64,
}

impl Simulation {
    pub fn new(settings: &Settings, tracker: &Tracker) -> Result<Self, SimError> {
        let engine = Engine::new_with_clock_mhz(tracker, settings.clock_mhz);
        let entity = Rc::new(Entity::new(engine.top(), "ring"));
        let dimension = if settings.local_ring {
            RingDimension::Local
        } else {
            RingDimension::Horizontal
        };

        let (sender, completions) = completion_channel();
        let mut participants = Vec::with_capacity(settings.ring_size);
        for id in 0..settings.ring_size {
            let participant_entity = Rc::new(Entity::new(&entity, &format!("rank{id}")));
            let topology = Rc::new(RingTopology::new(id, settings.ring_size, dimension)?);
            let algorithm = CollectiveAlgorithm::new(
                settings.algorithm,
                &participant_entity,
                settings.collective,
                topology,
                settings.total_bytes,
            )?;
            let session = SimSession::new(&participant_entity, STREAM_ID, QUEUE_ID, sender.clone());
            participants.push(Participant {
                entity: participant_entity,
                algorithm,
                session,
                finish_tick: None,
            });
        }

        info!(entity ; "{} over a ring of {} with {} bytes, {} algorithm",
            settings.collective, settings.ring_size, settings.total_bytes, settings.algorithm);

        let progress = settings
            .progress
            .then(|| ProgressBar::new(settings.ring_size as u64));

        Ok(Self {
            engine,
            entity,
            ring: Ring {
                participants,
                completions,
                bundle_delay_ticks: settings.bundle_delay_ticks,
                link_latency_ticks: settings.link_latency_ticks,
                num_finished: 0,
                progress,
            },
            finish_tick: settings.finish_tick,
        })
    }

    /// Run the collective on every participant.
    ///
    /// Fails if any participant has not finished once the simulation stops.
    pub fn run(&mut self) -> Result<Report, SimError> {
        for id in 0..self.ring.participants.len() {
            self.engine
                .schedule(0, id, SimEvent::Algorithm(AlgorithmEvent::Init));
        }

        let ring = &mut self.ring;
        let handler = |engine: &mut Engine<SimEvent>, delivery: Delivery<SimEvent>| {
            handle_delivery(engine, ring, delivery)
        };
        if self.finish_tick == 0 {
            self.engine.run(handler)?;
        } else {
            self.engine.run_until(self.finish_tick, handler)?;
        }

        if let Some(progress) = &self.ring.progress {
            progress.finish();
        }

        let time_ns = self.engine.time_now_ns();
        let mut reports = Vec::with_capacity(self.ring.participants.len());
        for (id, participant) in self.ring.participants.iter().enumerate() {
            let Some(finish_tick) = participant.finish_tick else {
                let CollectiveAlgorithm::Trivance(trivance) = &participant.algorithm;
                error!(participant.entity ; "unfinished in {} step {} after {} of {} receives",
                    trivance.phase(), trivance.step(),
                    trivance.flow().total_received(), trivance.flow().total_sent());
                error!(self.entity ; "Deadlock detected at {time_ns:.2}ns");
                return sim_error!(format!("Deadlock: participant {id} did not finish"));
            };
            reports.push(ParticipantReport {
                id,
                exchanges: num_exchanges(&participant.algorithm),
                bytes_sent: participant.session.bytes_sent(),
                finish_tick,
            });
        }

        let finish_tick = reports.iter().map(|r| r.finish_tick).max().unwrap_or(0);
        info!(self.entity ; "Pass ({time_ns:.2}ns)");
        Ok(Report {
            participants: reports,
            finish_tick,
            time_ns,
        })
    }

    #[must_use]
    pub fn participants(&self) -> &[Participant] {
        &self.ring.participants
    }

    /// Number of participants that have released their session.
    #[must_use]
    pub fn num_finished(&self) -> usize {
        self.ring.num_finished
    }

    #[must_use]
    pub fn engine(&self) -> &Engine<SimEvent> {
        &self.engine
    }
}

fn num_exchanges(algorithm: &CollectiveAlgorithm) -> usize {
    match algorithm {
        CollectiveAlgorithm::Trivance(trivance) => trivance.issued().len(),
    }
}

fn handle_delivery(
    engine: &mut Engine<SimEvent>,
    ring: &mut Ring,
    delivery: Delivery<SimEvent>,
) -> SimResult {
    let target = delivery.target;
    let Some(participant) = ring.participants.get_mut(target) else {
        return sim_error!(format!("event for unknown participant {target}"));
    };

    match delivery.event {
        SimEvent::Algorithm(event) => {
            trace!(participant.entity ; "{event:?}");
            participant.algorithm.on_event(event, &mut participant.session)?;
        }
        SimEvent::Arrival { src, tag, size } => {
            participant.session.deliver(src, tag, size)?;
        }
    }

    for outgoing in participant.session.take_outgoing() {
        match outgoing {
            Outgoing::Send(request) => {
                engine.schedule(
                    ring.link_latency_ticks,
                    request.dest,
                    SimEvent::Arrival {
                        src: request.src,
                        tag: request.tag,
                        size: request.size,
                    },
                );
            }
            Outgoing::Bundle(_) => {
                engine.schedule(
                    ring.bundle_delay_ticks,
                    target,
                    SimEvent::Algorithm(AlgorithmEvent::CreditReturn),
                );
            }
            Outgoing::Proceed => {
                if participant.finish_tick.is_some() {
                    return sim_error!(format!("participant {target} finished twice"));
                }
                debug!(participant.entity ; "finished at tick {}", delivery.tick);
                participant.finish_tick = Some(delivery.tick);
                ring.num_finished += 1;
                if let Some(progress) = &ring.progress {
                    progress.inc(1);
                }
            }
        }
    }

    while let Some(key) = ring.completions.try_recv() {
        engine.schedule(
            0,
            key.owner,
            SimEvent::Algorithm(AlgorithmEvent::ExchangeCompleted(key)),
        );
    }
    Ok(())
}
