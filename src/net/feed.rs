//! Event sources for headless runs: a seeded synthetic arena and
//! JSON-lines replays

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::game::constants::segments_for_mass;
use crate::game::state::{FoodId, SnakeId};
use crate::net::protocol::{decode_json_line, BotDescriptor, DecodeError, FoodSpawn, ViewEvent, WorldSnapshot};
use crate::util::vec2::Vec2;

/// Distance a synthetic bot travels per tick
const BOT_SPEED: f32 = 3.0;
/// Per-tick probabilities of the random arena events
const CONSUME_CHANCE: f64 = 0.3;
const DECAY_EVENT_CHANCE: f64 = 0.05;
const KILL_CHANCE: f64 = 0.002;

#[derive(Debug, Clone)]
struct FeedBot {
    id: SnakeId,
    name: String,
    color: u32,
    heading: f32,
    mass: f32,
    segments: Vec<Vec2>,
}

impl FeedBot {
    fn descriptor(&self) -> BotDescriptor {
        let mut desc = BotDescriptor::new(self.id, self.name.clone());
        desc.color = self.color;
        desc.mass = self.mass;
        desc.segments = self.segments.clone();
        desc
    }
}

/// Deterministic arena simulation producing view events
pub struct SyntheticFeed {
    rng: StdRng,
    world: Vec2,
    decay_rate: f32,
    bots: Vec<FeedBot>,
    food: Vec<FoodSpawn>,
    target_food: usize,
    next_bot_id: SnakeId,
    next_food_id: FoodId,
    frame: u64,
}

impl SyntheticFeed {
    pub fn new(seed: u64, bots: usize, food: usize, world_size: Vec2) -> Self {
        let mut feed = Self {
            rng: StdRng::seed_from_u64(seed),
            world: world_size,
            decay_rate: 0.001,
            bots: Vec::with_capacity(bots),
            food: Vec::with_capacity(food),
            target_food: food,
            next_bot_id: 1,
            next_food_id: 1,
            frame: 0,
        };
        for _ in 0..bots {
            let bot = feed.spawn_bot();
            feed.bots.push(bot);
        }
        for _ in 0..food {
            let spawn = feed.spawn_food();
            feed.food.push(spawn);
        }
        feed
    }

    /// World info plus a full snapshot; send these first
    pub fn initial_events(&self) -> Vec<ViewEvent> {
        vec![
            ViewEvent::WorldInfo {
                world_size_x: self.world.x,
                world_size_y: self.world.y,
                food_decay_rate: self.decay_rate,
            },
            ViewEvent::WorldUpdate(WorldSnapshot {
                bots: self.bots.iter().map(FeedBot::descriptor).collect(),
                food: self.food.clone(),
            }),
        ]
    }

    /// Simulate one tick and return its events, ending with `Tick`
    pub fn next_tick(&mut self) -> Vec<ViewEvent> {
        let mut events = Vec::with_capacity(self.bots.len() + 4);

        for i in 0..self.bots.len() {
            let turn = self.rng.gen_range(-0.3..0.3);
            let bot = &mut self.bots[i];
            bot.heading += turn;
            let Some(head) = bot.segments.first().copied() else {
                continue;
            };
            let mut next = head + Vec2::new(bot.heading.cos(), bot.heading.sin()) * BOT_SPEED;
            // Turn around at the walls
            if next.x < 0.0 || next.x >= self.world.x || next.y < 0.0 || next.y >= self.world.y {
                bot.heading += std::f32::consts::PI;
                next = head;
            }
            bot.segments.insert(0, next);
            bot.segments.truncate(segments_for_mass(bot.mass));
            events.push(ViewEvent::BotMoveHead {
                bot_id: bot.id,
                mass: bot.mass,
                positions: vec![next],
            });
        }

        if !self.food.is_empty() && !self.bots.is_empty() && self.rng.gen_bool(CONSUME_CHANCE) {
            let food = self.food.swap_remove(self.rng.gen_range(0..self.food.len()));
            let consumer = self.rng.gen_range(0..self.bots.len());
            self.bots[consumer].mass += food.value;
            events.push(ViewEvent::FoodConsumed {
                food_id: food.id,
                consumer_id: self.bots[consumer].id,
            });
        }

        if !self.food.is_empty() && self.rng.gen_bool(DECAY_EVENT_CHANCE) {
            let food = self.food.swap_remove(self.rng.gen_range(0..self.food.len()));
            events.push(ViewEvent::FoodDecayed { food_id: food.id });
        }

        while self.food.len() < self.target_food {
            let spawn = self.spawn_food();
            self.food.push(spawn);
            events.push(ViewEvent::FoodSpawn(spawn));
        }

        if !self.bots.is_empty() && self.rng.gen_bool(KILL_CHANCE) {
            let victim = self.rng.gen_range(0..self.bots.len());
            let killer_id = self.bots[self.rng.gen_range(0..self.bots.len())].id;
            let victim_id = self.bots[victim].id;
            let replacement = self.spawn_bot();
            events.push(ViewEvent::BotKilled { killer_id, victim_id });
            events.push(ViewEvent::BotSpawn(replacement.descriptor()));
            self.bots[victim] = replacement;
        }

        events.push(ViewEvent::Tick { frame_id: self.frame });
        self.frame += 1;
        events
    }

    fn spawn_bot(&mut self) -> FeedBot {
        let id = self.next_bot_id;
        self.next_bot_id += 1;
        let head = self.random_position();
        let heading = self.rng.gen_range(0.0..std::f32::consts::TAU);
        let mass = self.rng.gen_range(20.0..200.0);
        let back = Vec2::new(-heading.cos(), -heading.sin()) * BOT_SPEED;
        let segments = (0..segments_for_mass(mass))
            .map(|i| head + back * i as f32)
            .collect();
        FeedBot {
            id,
            name: format!("bot-{}", id),
            color: self.rng.gen_range(0..0x0100_0000),
            heading,
            mass,
            segments,
        }
    }

    fn spawn_food(&mut self) -> FoodSpawn {
        let id = self.next_food_id;
        self.next_food_id = self.next_food_id.wrapping_add(1);
        let position = self.random_position();
        FoodSpawn {
            id,
            position,
            value: self.rng.gen_range(0.2..3.0),
        }
    }

    fn random_position(&mut self) -> Vec2 {
        Vec2::new(
            self.rng.gen_range(0.0..self.world.x),
            self.rng.gen_range(0.0..self.world.y),
        )
    }

    pub fn bot_count(&self) -> usize {
        self.bots.len()
    }

    pub fn food_count(&self) -> usize {
        self.food.len()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("failed to read replay: {0}")]
    Io(#[from] std::io::Error),
    #[error("replay line {line}: {source}")]
    Decode {
        line: usize,
        #[source]
        source: DecodeError,
    },
}

/// Parse a JSON-lines replay. Blank lines and `#` comments are skipped.
pub fn read_replay<R: BufRead>(reader: R) -> Result<Vec<ViewEvent>, ReplayError> {
    let mut events = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let event = decode_json_line(trimmed).map_err(|source| ReplayError::Decode {
            line: index + 1,
            source,
        })?;
        events.push(event);
    }
    Ok(events)
}

pub fn load_replay(path: impl AsRef<Path>) -> Result<Vec<ViewEvent>, ReplayError> {
    let file = File::open(path)?;
    read_replay(BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(seed: u64) -> SyntheticFeed {
        SyntheticFeed::new(seed, 5, 50, Vec2::new(1024.0, 1024.0))
    }

    #[test]
    fn test_initial_events() {
        let events = feed(1).initial_events();
        assert!(matches!(events[0], ViewEvent::WorldInfo { .. }));
        match &events[1] {
            ViewEvent::WorldUpdate(snapshot) => {
                assert_eq!(snapshot.bots.len(), 5);
                assert_eq!(snapshot.food.len(), 50);
            }
            other => panic!("Wrong event type: {:?}", other),
        }
    }

    #[test]
    fn test_same_seed_same_stream() {
        let mut a = feed(7);
        let mut b = feed(7);
        for _ in 0..50 {
            assert_eq!(a.next_tick(), b.next_tick());
        }
    }

    #[test]
    fn test_tick_ends_with_heartbeat_and_keeps_food_level() {
        let mut f = feed(3);
        for frame in 0..100 {
            let events = f.next_tick();
            assert_eq!(events.last(), Some(&ViewEvent::Tick { frame_id: frame }));
            assert_eq!(f.food_count(), 50);
            assert_eq!(f.bot_count(), 5);
        }
    }

    #[test]
    fn test_bots_stay_inside_world() {
        let mut f = feed(11);
        for _ in 0..500 {
            for event in f.next_tick() {
                if let ViewEvent::BotMoveHead { positions, .. } = event {
                    for p in positions {
                        assert!(p.x >= 0.0 && p.x < 1024.0 && p.y >= 0.0 && p.y < 1024.0);
                    }
                }
            }
        }
    }

    #[test]
    fn test_read_replay_skips_blank_and_comments() {
        let text = "# recorded\n{\"Tick\":{\"frame_id\":1}}\n\n{\"FoodDecayed\":{\"food_id\":4}}\n";
        let events = read_replay(text.as_bytes()).unwrap();
        assert_eq!(
            events,
            vec![ViewEvent::Tick { frame_id: 1 }, ViewEvent::FoodDecayed { food_id: 4 }]
        );
    }

    #[test]
    fn test_read_replay_reports_line() {
        let text = "{\"Tick\":{\"frame_id\":1}}\nnot json\n";
        match read_replay(text.as_bytes()) {
            Err(ReplayError::Decode { line, .. }) => assert_eq!(line, 2),
            other => panic!("Expected decode error, got {:?}", other),
        }
    }

    #[test]
    fn test_load_missing_replay() {
        assert!(matches!(
            load_replay("/nonexistent/replay.jsonl"),
            Err(ReplayError::Io(_))
        ));
    }
}
