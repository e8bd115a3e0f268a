//! Matching child element sequences against content model particles.
//!
//! The matcher explores every way a particle can consume the children,
//! keeping one state per reachable position, so optional and repeated
//! particles backtrack without exponential blow-up. Each state remembers
//! which declaration took which child so the caller can recurse.

use std::collections::HashSet;
use std::rc::Rc;

use tracing::warn;

use super::model::{ElementDecl, Particle, QName, Schema, Term, Wildcard};

/// What a child element was matched against.
#[derive(Debug, Clone, Copy)]
pub enum Binding<'p> {
    Element(&'p ElementDecl),
    Wildcard(&'p Wildcard),
    /// Matched a reference to a component that could not be loaded.
    Unchecked,
}

/// Why a child sequence does not fit the content model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mismatch {
    /// The child at `index` cannot appear there.
    Unexpected { index: usize, expected: Vec<String> },
    /// All children fit but required ones are missing at the end.
    Incomplete { expected: Vec<String> },
}

struct Link<'p> {
    binding: Binding<'p>,
    prev: Option<Rc<Link<'p>>>,
}

#[derive(Clone)]
struct State<'p> {
    pos: usize,
    chain: Option<Rc<Link<'p>>>,
}

impl<'p> State<'p> {
    fn advance(&self, binding: Binding<'p>) -> Self {
        State {
            pos: self.pos + 1,
            chain: Some(Rc::new(Link {
                binding,
                prev: self.chain.clone(),
            })),
        }
    }

    fn bindings(&self) -> Vec<Binding<'p>> {
        let mut out = Vec::with_capacity(self.pos);
        let mut link = self.chain.as_deref();
        while let Some(current) = link {
            out.push(current.binding);
            link = current.prev.as_deref();
        }
        out.reverse();
        out
    }
}

const MAX_GROUP_DEPTH: usize = 64;

struct Matcher<'p, 'c> {
    schema: &'p Schema,
    children: &'c [QName],
    furthest: usize,
    expected: Vec<String>,
    depth: usize,
}

/// Match `children` against `particles` taken as one sequence and return
/// the declaration bound to each child.
pub fn match_children<'p>(
    schema: &'p Schema,
    particles: &[&'p Particle],
    children: &[QName],
) -> Result<Vec<Binding<'p>>, Mismatch> {
    let mut matcher = Matcher {
        schema,
        children,
        furthest: 0,
        expected: Vec::new(),
        depth: 0,
    };

    let mut states = vec![State { pos: 0, chain: None }];
    for particle in particles {
        states = matcher.particle(particle, states);
        if states.is_empty() {
            break;
        }
    }

    if let Some(done) = states.iter().find(|s| s.pos == children.len()) {
        return Ok(done.bindings());
    }

    let reached = states.iter().map(|s| s.pos).max().unwrap_or(0);
    if reached > matcher.furthest {
        return Err(Mismatch::Unexpected {
            index: reached,
            expected: Vec::new(),
        });
    }
    if matcher.furthest < children.len() {
        Err(Mismatch::Unexpected {
            index: matcher.furthest,
            expected: matcher.expected,
        })
    } else {
        Err(Mismatch::Incomplete {
            expected: matcher.expected,
        })
    }
}

impl<'p> Matcher<'p, '_> {
    fn expect(&mut self, pos: usize, label: String) {
        if pos > self.furthest {
            self.furthest = pos;
            self.expected.clear();
        }
        if pos == self.furthest && !self.expected.contains(&label) {
            self.expected.push(label);
        }
    }

    fn particle(&mut self, particle: &'p Particle, states: Vec<State<'p>>) -> Vec<State<'p>> {
        let mut frontier = dedup(states);
        let mut results = Vec::new();
        let mut visited = HashSet::new();

        if particle.min == 0 {
            visited.extend(frontier.iter().map(|s| s.pos));
            results.extend(frontier.iter().cloned());
        }

        let mut count = 0u32;
        while !frontier.is_empty() && particle.max.is_none_or(|max| count < max) {
            let next = dedup(self.term(&particle.term, frontier));
            count += 1;
            if count >= particle.min {
                // positions already accepted cannot lead anywhere new
                frontier = next.into_iter().filter(|s| visited.insert(s.pos)).collect();
                results.extend(frontier.iter().cloned());
            } else {
                frontier = next;
            }
        }

        results
    }

    fn term(&mut self, term: &'p Term, states: Vec<State<'p>>) -> Vec<State<'p>> {
        match term {
            Term::Element(decl) => self.element(&decl.name, Binding::Element(decl), states),
            Term::ElementRef(name) => match self.schema.element(name) {
                Some(decl) => self.element(name, Binding::Element(decl), states),
                None => {
                    if !self.schema.is_lax(name.namespace.as_deref()) {
                        warn!("Element reference {} is not declared", name);
                    }
                    self.element(name, Binding::Unchecked, states)
                }
            },
            Term::Any(wildcard) => states
                .into_iter()
                .filter_map(|state| match self.children.get(state.pos) {
                    Some(child) if wildcard.allows(child.namespace.as_deref()) => {
                        Some(state.advance(Binding::Wildcard(wildcard)))
                    }
                    _ => {
                        self.expect(state.pos, "*".to_string());
                        None
                    }
                })
                .collect(),
            Term::Sequence(items) => {
                let mut states = states;
                for item in items {
                    states = self.particle(item, states);
                    if states.is_empty() {
                        break;
                    }
                }
                states
            }
            Term::Choice(items) => {
                let mut out = Vec::new();
                for item in items {
                    out.extend(self.particle(item, states.clone()));
                }
                out
            }
            Term::All(items) => states
                .into_iter()
                .filter_map(|state| self.all(items, state))
                .collect(),
            Term::Group(name) => {
                let Some(group) = self.schema.group(name) else {
                    warn!("Model group {} is not declared", name);
                    return states;
                };
                if self.depth >= MAX_GROUP_DEPTH {
                    return Vec::new();
                }
                self.depth += 1;
                let out = self.particle(group, states);
                self.depth -= 1;
                out
            }
        }
    }

    fn element(&mut self, name: &QName, binding: Binding<'p>, states: Vec<State<'p>>) -> Vec<State<'p>> {
        states
            .into_iter()
            .filter_map(|state| match self.children.get(state.pos) {
                Some(child) if child == name => Some(state.advance(binding)),
                _ => {
                    self.expect(state.pos, name.to_string());
                    None
                }
            })
            .collect()
    }

    /// `xs:all`: every member at most once, in any order.
    fn all(&mut self, items: &'p [Particle], state: State<'p>) -> Option<State<'p>> {
        let mut used = vec![false; items.len()];
        let mut state = state;

        while let Some(child) = self.children.get(state.pos) {
            let found = items.iter().enumerate().find_map(|(i, item)| {
                if used[i] {
                    return None;
                }
                self.all_member(item, child).map(|binding| (i, binding))
            });
            let Some((i, binding)) = found else {
                break;
            };
            used[i] = true;
            state = state.advance(binding);
        }

        let missing: Vec<String> = items
            .iter()
            .zip(&used)
            .filter(|(item, used)| item.min > 0 && !**used)
            .filter_map(|(item, _)| member_name(item).map(|n| n.to_string()))
            .collect();
        if missing.is_empty() {
            return Some(state);
        }
        for label in missing {
            self.expect(state.pos, label);
        }
        None
    }

    fn all_member(&self, item: &'p Particle, child: &QName) -> Option<Binding<'p>> {
        match &item.term {
            Term::Element(decl) if decl.name == *child => Some(Binding::Element(decl)),
            Term::ElementRef(name) if name == child => Some(
                self.schema
                    .element(name)
                    .map(Binding::Element)
                    .unwrap_or(Binding::Unchecked),
            ),
            _ => None,
        }
    }
}

fn member_name(item: &Particle) -> Option<&QName> {
    match &item.term {
        Term::Element(decl) => Some(&decl.name),
        Term::ElementRef(name) => Some(name),
        _ => None,
    }
}

/// Keep the first state per position.
fn dedup(states: Vec<State<'_>>) -> Vec<State<'_>> {
    let mut seen = HashSet::new();
    states.into_iter().filter(|s| seen.insert(s.pos)).collect()
}
