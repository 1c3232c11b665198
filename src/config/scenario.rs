//! Line-oriented scenario format
//!
//! A scenario is a sequence of sections separated by blank lines. Each section
//! is a header line, a count line and then that many entries:
//!
//! ```text
//! BELTS
//! 1
//! 1 length 3 destinations 1 2
//!
//! HOPPERS
//! 1
//! 1 belt 1 capacity 10 speed 2
//!
//! SACKS
//! 2
//! 1 capacity 5 age 0-3
//! 2 capacity 5 age 4-6
//!
//! TURNTABLES
//! 1
//! A N ib 1 E os 1 S os 2 W null
//!
//! PRESENTS 1
//! 2
//! 0-3
//! 4-6
//!
//! ELVES
//! 1
//! 1 sacks 1 2
//!
//! TIMER 10
//! ```
//!
//! Belt destinations name sacks; they become the belt's reachable tags once
//! every sack has been read. `TIMER` has no count line or entries.

use super::{
    BufferConfig, DrainerConfig, MachineConfig, PortConfig, ProducerConfig, RouterConfig,
    SinkConfig,
};
use crate::error::{Result, SortError};
use crate::pipeline::id::{BufferId, DrainerId, PortIndex, ProducerId, RouterId, SinkId};
use crate::pipeline::port::PortKind;
use std::collections::HashMap;
use std::str::{FromStr, SplitWhitespace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Belts,
    Hoppers,
    Sacks,
    Turntables,
    Presents(ProducerId),
    Elves,
}

enum Stage {
    Header,
    Count { section: Section, header_line: usize },
    Entries { section: Section, header_line: usize, expected: usize, seen: usize },
}

/// Belt whose destinations still name sacks rather than tags.
struct PendingBelt {
    line: usize,
    id: BufferId,
    capacity: usize,
    destinations: Vec<SinkId>,
}

#[derive(Default)]
struct Builder {
    config: MachineConfig,
    belts: Vec<PendingBelt>,
}

/// Parse scenario text into a machine configuration.
///
/// Only the shape of the text is checked here; topology rules are left to
/// [`MachineConfig::validate`]. The one exception is a `PRESENTS` section
/// larger than its hopper, which is rejected as soon as its count is read.
pub fn parse(text: &str) -> Result<MachineConfig> {
    let mut builder = Builder::default();
    let mut stage = Stage::Header;
    let mut last_line = 0;

    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let content = raw.trim();
        last_line = line;

        stage = match stage {
            Stage::Header if content.is_empty() => Stage::Header,
            Stage::Header => builder.header(line, content)?,
            Stage::Count { section, header_line } => {
                let expected = Tokens::new(line, content).number::<usize>("count")?;
                builder.count(line, section, expected)?;
                Stage::Entries {
                    section,
                    header_line,
                    expected,
                    seen: 0,
                }
            }
            Stage::Entries {
                section,
                header_line,
                expected,
                seen,
            } => {
                if content.is_empty() {
                    check_count(header_line, line, expected, seen)?;
                    Stage::Header
                } else {
                    if seen == expected {
                        return Err(parse_error(
                            line,
                            format!("section declared {expected} entries but has more"),
                        ));
                    }
                    builder.entry(line, section, content)?;
                    Stage::Entries {
                        section,
                        header_line,
                        expected,
                        seen: seen + 1,
                    }
                }
            }
        };
    }

    match stage {
        Stage::Header => {}
        Stage::Count { header_line, .. } => {
            return Err(parse_error(header_line, "section is missing its count line"));
        }
        Stage::Entries {
            header_line,
            expected,
            seen,
            ..
        } => check_count(header_line, last_line, expected, seen)?,
    }

    builder.finish()
}

fn check_count(header_line: usize, line: usize, expected: usize, seen: usize) -> Result<()> {
    if seen == expected {
        Ok(())
    } else {
        Err(parse_error(
            line,
            format!("section starting on line {header_line} declared {expected} entries but has {seen}"),
        ))
    }
}

fn parse_error(line: usize, message: impl Into<String>) -> SortError {
    SortError::Parse {
        line,
        message: message.into(),
    }
}

impl Builder {
    fn header(&mut self, line: usize, content: &str) -> Result<Stage> {
        let mut tokens = Tokens::new(line, content);
        let keyword = tokens.next("section header")?;

        let section = match keyword {
            "BELTS" => Section::Belts,
            "HOPPERS" => Section::Hoppers,
            "SACKS" => Section::Sacks,
            "TURNTABLES" => Section::Turntables,
            "ELVES" => Section::Elves,
            "PRESENTS" => {
                let hopper = tokens.optional_number::<u32>("hopper id")?.unwrap_or(1);
                Section::Presents(ProducerId(hopper))
            }
            "TIMER" => {
                self.config.duration_secs = tokens.number("timer length")?;
                tokens.end()?;
                return Ok(Stage::Header);
            }
            other => return Err(parse_error(line, format!("unknown section {other:?}"))),
        };
        tokens.end()?;

        Ok(Stage::Count {
            section,
            header_line: line,
        })
    }

    fn count(&mut self, line: usize, section: Section, count: usize) -> Result<()> {
        if let Section::Presents(hopper) = section {
            let producer = self.producer(line, hopper)?;
            if producer.items.len() + count > producer.capacity {
                return Err(SortError::config(format!(
                    "line {line}: {hopper} cannot hold {} presents (capacity {})",
                    producer.items.len() + count,
                    producer.capacity
                )));
            }
        }
        Ok(())
    }

    fn entry(&mut self, line: usize, section: Section, content: &str) -> Result<()> {
        let mut tokens = Tokens::new(line, content);

        match section {
            Section::Belts => {
                let id = BufferId(tokens.number("belt id")?);
                tokens.keyword("length")?;
                let capacity = tokens.number("belt length")?;
                tokens.keyword("destinations")?;
                let destinations = tokens.remaining_numbers::<u32>("destination sack id")?;
                self.belts.push(PendingBelt {
                    line,
                    id,
                    capacity,
                    destinations: destinations.into_iter().map(SinkId).collect(),
                });
            }
            Section::Hoppers => {
                let id = ProducerId(tokens.number("hopper id")?);
                tokens.keyword("belt")?;
                let buffer = BufferId(tokens.number("belt id")?);
                tokens.keyword("capacity")?;
                let capacity = tokens.number("hopper capacity")?;
                tokens.keyword("speed")?;
                let rate = tokens.number("hopper speed")?;
                tokens.end()?;
                self.config.producers.push(ProducerConfig {
                    id,
                    buffer,
                    capacity,
                    rate,
                    items: Vec::new(),
                });
            }
            Section::Sacks => {
                let id = SinkId(tokens.number("sack id")?);
                tokens.keyword("capacity")?;
                let capacity = tokens.number("sack capacity")?;
                tokens.keyword("age")?;
                let tag = tokens.next("age range")?.to_string();
                tokens.end()?;
                self.config.sinks.push(SinkConfig { id, capacity, tag });
            }
            Section::Turntables => {
                let router = turntable(&mut tokens)?;
                self.config.routers.push(router);
            }
            Section::Presents(hopper) => {
                let tag = tokens.next("present age range")?.to_string();
                tokens.end()?;
                self.producer(line, hopper)?.items.push(tag);
            }
            Section::Elves => {
                let id = DrainerId(tokens.number("elf id")?);
                tokens.keyword("sacks")?;
                let sinks = tokens.remaining_numbers::<u32>("sack id")?;
                self.config.drainers.push(DrainerConfig {
                    id,
                    sinks: sinks.into_iter().map(SinkId).collect(),
                });
            }
        }
        Ok(())
    }

    fn producer(&mut self, line: usize, id: ProducerId) -> Result<&mut ProducerConfig> {
        self.config
            .producers
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| parse_error(line, format!("presents for undeclared {id}")))
    }

    fn finish(mut self) -> Result<MachineConfig> {
        let tags: HashMap<SinkId, &str> = self
            .config
            .sinks
            .iter()
            .map(|s| (s.id, s.tag.as_str()))
            .collect();

        let mut buffers = Vec::with_capacity(self.belts.len());
        for belt in &self.belts {
            let mut reachable_tags = Vec::with_capacity(belt.destinations.len());
            for sink in &belt.destinations {
                let tag = tags.get(sink).ok_or_else(|| {
                    parse_error(belt.line, format!("{} leads to undeclared {}", belt.id, sink))
                })?;
                if !reachable_tags.iter().any(|t: &String| t == tag) {
                    reachable_tags.push(tag.to_string());
                }
            }
            buffers.push(BufferConfig {
                id: belt.id,
                capacity: belt.capacity,
                reachable_tags,
            });
        }

        self.config.buffers = buffers;
        Ok(self.config)
    }
}

/// `A N ib 1 E os 1 S os 2 W null`
fn turntable(tokens: &mut Tokens<'_>) -> Result<RouterConfig> {
    let id = RouterId::from(tokens.next("turntable id")?);
    let mut ports = [PortConfig::none(); crate::pipeline::id::PORT_COUNT];
    let mut declared = [false; crate::pipeline::id::PORT_COUNT];

    while let Some(direction) = tokens.peek() {
        tokens.next("direction")?;
        let port = PortIndex::from_compass(direction)
            .ok_or_else(|| tokens.error(format!("expected a direction (N/E/S/W), found {direction:?}")))?;
        if declared[port.index()] {
            return Err(tokens.error(format!("{id} declares port {port} twice")));
        }
        declared[port.index()] = true;

        let code = tokens.next("port role")?;
        let role = PortKind::from_short(code)
            .ok_or_else(|| tokens.error(format!("unknown port role {code:?}")))?;
        let target = match role {
            PortKind::None => None,
            _ => Some(tokens.number::<u32>("port target")?),
        };
        ports[port.index()] = PortConfig { role, target };
    }

    Ok(RouterConfig { id, ports })
}

/// Whitespace tokens of one line, with errors pinned to that line.
struct Tokens<'a> {
    line: usize,
    iter: std::iter::Peekable<SplitWhitespace<'a>>,
}

impl<'a> Tokens<'a> {
    fn new(line: usize, content: &'a str) -> Self {
        Self {
            line,
            iter: content.split_whitespace().peekable(),
        }
    }

    fn error(&self, message: impl Into<String>) -> SortError {
        parse_error(self.line, message)
    }

    fn peek(&mut self) -> Option<&'a str> {
        self.iter.peek().copied()
    }

    fn next(&mut self, what: &str) -> Result<&'a str> {
        self.iter
            .next()
            .ok_or_else(|| self.error(format!("expected {what}")))
    }

    fn number<T: FromStr>(&mut self, what: &str) -> Result<T> {
        let token = self.next(what)?;
        token
            .parse()
            .map_err(|_| self.error(format!("expected {what}, found {token:?}")))
    }

    fn optional_number<T: FromStr>(&mut self, what: &str) -> Result<Option<T>> {
        match self.peek() {
            Some(_) => self.number(what).map(Some),
            None => Ok(None),
        }
    }

    fn remaining_numbers<T: FromStr>(&mut self, what: &str) -> Result<Vec<T>> {
        let mut values = Vec::new();
        while self.peek().is_some() {
            values.push(self.number(what)?);
        }
        Ok(values)
    }

    fn keyword(&mut self, expected: &str) -> Result<()> {
        let token = self.next(expected)?;
        if token == expected {
            Ok(())
        } else {
            Err(self.error(format!("expected {expected:?}, found {token:?}")))
        }
    }

    fn end(&mut self) -> Result<()> {
        match self.iter.next() {
            None => Ok(()),
            Some(extra) => Err(self.error(format!("unexpected {extra:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = "\
BELTS
2
1 length 3 destinations 1 2
2 length 2 destinations 2

HOPPERS
1
1 belt 1 capacity 10 speed 2

SACKS
2
1 capacity 5 age 0-3
2 capacity 4 age 4-6

TURNTABLES
2
A N ib 1 E os 1 S ob 2 W null
B N ib 2 S os 2

PRESENTS 1
3
0-3
4-6
0-3

ELVES
1
1 sacks 1 2

TIMER 12
";

    fn line_of(err: SortError) -> usize {
        match err {
            SortError::Parse { line, .. } => line,
            other => panic!("expected a parse error, got {other}"),
        }
    }

    #[test]
    fn test_full_scenario() {
        let config = parse(SCENARIO).unwrap();

        assert_eq!(config.duration_secs, 12);
        assert_eq!(config.buffers.len(), 2);
        assert_eq!(config.buffers[0].reachable_tags, vec!["0-3", "4-6"]);
        assert_eq!(config.buffers[1].reachable_tags, vec!["4-6"]);

        let hopper = &config.producers[0];
        assert_eq!(hopper.buffer, BufferId(1));
        assert_eq!(hopper.capacity, 10);
        assert_eq!(hopper.rate, 2.0);
        assert_eq!(hopper.items, vec!["0-3", "4-6", "0-3"]);

        assert_eq!(config.sinks[1].tag, "4-6");
        assert_eq!(
            config.routers[0].ports,
            [
                PortConfig::input(1),
                PortConfig::output_sink(1),
                PortConfig::output_buffer(2),
                PortConfig::none(),
            ]
        );
        assert_eq!(config.routers[1].ports[1], PortConfig::none());
        assert_eq!(config.drainers[0].sinks, vec![SinkId(1), SinkId(2)]);

        config.validate().unwrap();
    }

    #[test]
    fn test_elves_are_optional() {
        let text = SCENARIO.replace("ELVES\n1\n1 sacks 1 2\n\n", "");
        let config = parse(&text).unwrap();
        assert!(config.drainers.is_empty());
    }

    #[test]
    fn test_too_many_presents() {
        let text = SCENARIO.replace("capacity 10 speed", "capacity 2 speed");
        let err = parse(&text).unwrap_err();
        assert!(matches!(err, SortError::Config(_)));
        assert!(err.to_string().contains("cannot hold 3 presents"));
    }

    #[test]
    fn test_bad_keyword_reports_line() {
        let text = SCENARIO.replace("1 belt 1 capacity", "1 conveyor 1 capacity");
        assert_eq!(line_of(parse(&text).unwrap_err()), 8);
    }

    #[test]
    fn test_unknown_section() {
        let err = parse("REINDEER\n1\n").unwrap_err();
        assert_eq!(line_of(err), 1);
    }

    #[test]
    fn test_count_mismatch() {
        let err = parse("SACKS\n2\n1 capacity 5 age 0-3\n").unwrap_err();
        assert_eq!(line_of(err), 3);

        let err = parse("SACKS\n1\n1 capacity 5 age 0-3\n2 capacity 5 age 4-6\n").unwrap_err();
        assert_eq!(line_of(err), 4);
    }

    #[test]
    fn test_destination_must_be_a_sack() {
        let err = parse("BELTS\n1\n1 length 3 destinations 9\n\nTIMER 1\n").unwrap_err();
        assert_eq!(line_of(err), 3);
    }

    #[test]
    fn test_duplicate_turntable_direction() {
        let err = parse("TURNTABLES\n1\nA N ib 1 N os 1\n").unwrap_err();
        assert!(err.to_string().contains("twice"));
    }

    #[test]
    fn test_presents_for_unknown_hopper() {
        let err = parse("PRESENTS 4\n1\n0-3\n").unwrap_err();
        assert_eq!(line_of(err), 2);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scenario1.txt");
        std::fs::write(&path, SCENARIO).unwrap();
        let config = MachineConfig::load(&path).unwrap();
        assert_eq!(config.total_items(), 3);
    }
}
