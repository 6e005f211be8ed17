//! State machine definition types.
//!
//! Machine definitions use a JSON (or YAML) DSL:
//!
//! ```json
//! {
//!   "initial": "idle",
//!   "finals": ["done"],
//!   "states": [
//!     "idle",
//!     {"id": "fork", "role": "fork"},
//!     {"id": "work"},
//!     {"id": "a1", "parent": "work", "region": "a", "kind": "initial"},
//!     {"id": "a2", "parent": "work", "region": "a", "kind": "end"},
//!     {"id": "b1", "parent": "work", "region": "b", "kind": "initial"},
//!     {"id": "b2", "parent": "work", "region": "b", "kind": "end"},
//!     {"id": "join", "role": "join"},
//!     "done"
//!   ],
//!   "transitions": [
//!     {"from": "idle", "event": "GO", "to": "fork"},
//!     {"from": "fork", "to": "work"},
//!     {"from": "a1", "event": "A", "to": "a2"},
//!     {"from": "b1", "event": "B", "to": "b2"},
//!     {"from": "work", "to": "join"},
//!     {"from": "join", "to": "done"}
//!   ]
//! }
//! ```
//!
//! A state that is the `parent` of other states is a composite; its children
//! are split into regions by name. Transitions without an `event` are
//! automatic: a fork expands into its composite, a composite completes into
//! its target once every region sits in an end state, and a join continues to
//! its target.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Region name used for children that do not name one.
pub const DEFAULT_REGION: &str = "main";

/// Identifier of a state in the machine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateId(pub String);

impl StateId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StateId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for StateId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Marks the initial and end states of a region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateKind {
    #[default]
    Plain,
    Initial,
    End,
}

impl StateKind {
    fn is_plain(&self) -> bool {
        *self == StateKind::Plain
    }
}

/// Pseudo-state roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PseudoRole {
    Fork,
    Join,
}

impl fmt::Display for PseudoRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PseudoRole::Fork => f.write_str("fork"),
            PseudoRole::Join => f.write_str("join"),
        }
    }
}

/// A state declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDecl {
    pub id: StateId,

    #[serde(default, skip_serializing_if = "StateKind::is_plain")]
    pub kind: StateKind,

    /// Composite this state belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<StateId>,

    /// Region inside the parent composite.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<PseudoRole>,

    /// Action ids run when the state is entered.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entry: Vec<String>,

    /// Action ids run when the state is exited.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exit: Vec<String>,
}

impl StateDecl {
    pub fn new(id: impl Into<StateId>) -> Self {
        Self {
            id: id.into(),
            kind: StateKind::Plain,
            parent: None,
            region: None,
            role: None,
            entry: Vec::new(),
            exit: Vec::new(),
        }
    }

    pub fn parent(mut self, parent: impl Into<StateId>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn initial(mut self) -> Self {
        self.kind = StateKind::Initial;
        self
    }

    pub fn end(mut self) -> Self {
        self.kind = StateKind::End;
        self
    }

    pub fn fork(mut self) -> Self {
        self.role = Some(PseudoRole::Fork);
        self
    }

    pub fn join(mut self) -> Self {
        self.role = Some(PseudoRole::Join);
        self
    }

    pub fn entry(mut self, action: impl Into<String>) -> Self {
        self.entry.push(action.into());
        self
    }

    pub fn exit(mut self, action: impl Into<String>) -> Self {
        self.exit.push(action.into());
        self
    }
}

/// A transition declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionDecl {
    /// Source state(s). Can be a single state or multiple.
    #[serde(deserialize_with = "deserialize_from_states")]
    pub from: Vec<StateId>,

    /// Event that triggers this transition. `None` for automatic transitions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,

    /// Target state.
    pub to: StateId,
}

fn deserialize_from_states<'de, D>(deserializer: D) -> Result<Vec<StateId>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{self, Visitor};

    struct FromStatesVisitor;

    impl<'de> Visitor<'de> for FromStatesVisitor {
        type Value = Vec<StateId>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string or array of strings")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(vec![StateId::from(v)])
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: de::SeqAccess<'de>,
        {
            let mut states = Vec::new();
            while let Some(s) = seq.next_element::<String>()? {
                states.push(StateId(s));
            }
            Ok(states)
        }
    }

    deserializer.deserialize_any(FromStatesVisitor)
}

fn deserialize_states<'de, D>(deserializer: D) -> Result<Vec<StateDecl>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StateEntry {
        Name(String),
        Decl(StateDecl),
    }

    let entries = Vec::<StateEntry>::deserialize(deserializer)?;
    Ok(entries
        .into_iter()
        .map(|entry| match entry {
            StateEntry::Name(name) => StateDecl::new(name),
            StateEntry::Decl(decl) => decl,
        })
        .collect())
}

/// Raw machine definition as written by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineDefinitionRaw {
    /// State declarations. A bare string declares a plain top-level state.
    #[serde(deserialize_with = "deserialize_states")]
    pub states: Vec<StateDecl>,

    /// Initial state of the machine.
    pub initial: StateId,

    /// Final states; reaching one completes the machine.
    #[serde(alias = "end")]
    pub finals: Vec<StateId>,

    #[serde(default)]
    pub transitions: Vec<TransitionDecl>,

    /// Optional metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

impl MachineDefinitionRaw {
    /// Starts an empty definition with the given initial state.
    pub fn new(initial: impl Into<StateId>) -> Self {
        Self {
            states: Vec::new(),
            initial: initial.into(),
            finals: Vec::new(),
            transitions: Vec::new(),
            meta: None,
        }
    }

    pub fn state(mut self, decl: impl Into<StateDecl>) -> Self {
        self.states.push(decl.into());
        self
    }

    pub fn final_state(mut self, state: impl Into<StateId>) -> Self {
        self.finals.push(state.into());
        self
    }

    /// Adds an event-triggered transition.
    pub fn transition(
        mut self,
        from: impl Into<StateId>,
        event: impl Into<String>,
        to: impl Into<StateId>,
    ) -> Self {
        self.transitions.push(TransitionDecl {
            from: vec![from.into()],
            event: Some(event.into()),
            to: to.into(),
        });
        self
    }

    /// Adds an automatic (fork, completion or join) transition.
    pub fn automatic(mut self, from: impl Into<StateId>, to: impl Into<StateId>) -> Self {
        self.transitions.push(TransitionDecl {
            from: vec![from.into()],
            event: None,
            to: to.into(),
        });
        self
    }
}

impl From<&str> for StateDecl {
    fn from(id: &str) -> Self {
        StateDecl::new(id)
    }
}

/// Validated state.
#[derive(Debug, Clone)]
pub struct StateInfo {
    pub id: StateId,
    pub kind: StateKind,
    pub parent: Option<StateId>,
    /// Region name for states inside a composite.
    pub region: Option<String>,
    pub role: Option<PseudoRole>,
    pub entry: Vec<String>,
    pub exit: Vec<String>,
}

/// One independently progressing region of a composite.
#[derive(Debug, Clone)]
pub struct Region {
    pub name: String,
    pub initial: StateId,
    pub ends: HashSet<StateId>,
    pub states: Vec<StateId>,
}

impl Region {
    /// Returns true when `state` is one of the region's end states.
    pub fn is_end(&self, state: &StateId) -> bool {
        self.ends.contains(state)
    }
}

struct RegionDraft {
    name: String,
    initial: Option<StateId>,
    ends: HashSet<StateId>,
    states: Vec<StateId>,
}

/// Validated and indexed machine definition.
#[derive(Debug, Clone)]
pub struct MachineDefinition {
    /// Machine name.
    pub name: String,

    /// Initial state for new instances.
    pub initial: StateId,

    states: HashMap<StateId, StateInfo>,

    /// Declaration order of states.
    order: Vec<StateId>,

    finals: HashSet<StateId>,

    /// Transitions indexed by (from_state, event) -> to_state.
    transitions: HashMap<(StateId, String), StateId>,

    /// Automatic transitions of forks, composites and joins.
    automatic: HashMap<StateId, StateId>,

    /// Regions of each composite, in declaration order.
    regions: HashMap<StateId, Vec<Region>>,

    /// Raw definition as submitted.
    pub raw: MachineDefinitionRaw,

    /// Hash of the definition for integrity checks.
    pub checksum: String,
}

impl MachineDefinition {
    /// Parses and validates a machine definition from JSON.
    pub fn from_json(name: impl Into<String>, json: &serde_json::Value) -> Result<Self, CoreError> {
        let raw: MachineDefinitionRaw = serde_json::from_value(json.clone())?;
        Self::from_raw(name, raw)
    }

    /// Parses and validates a machine definition from a JSON string.
    pub fn from_json_str(name: impl Into<String>, json: &str) -> Result<Self, CoreError> {
        let raw: MachineDefinitionRaw = serde_json::from_str(json)?;
        Self::from_raw(name, raw)
    }

    /// Parses and validates a machine definition from a YAML string.
    pub fn from_yaml_str(name: impl Into<String>, yaml: &str) -> Result<Self, CoreError> {
        let raw: MachineDefinitionRaw = serde_yaml::from_str(yaml)?;
        Self::from_raw(name, raw)
    }

    /// Validates raw parts and builds the lookup tables.
    pub fn from_raw(name: impl Into<String>, raw: MachineDefinitionRaw) -> Result<Self, CoreError> {
        let name = name.into();

        let (states, order) = index_states(&raw)?;
        let regions = build_regions(&states, &order)?;
        let finals = validate_endpoints(&raw, &states, &regions)?;
        let (transitions, automatic) = index_transitions(&raw, &states, &regions, &finals)?;

        for id in &order {
            match states[id].role {
                Some(PseudoRole::Fork) if !automatic.contains_key(id) => {
                    return Err(CoreError::definition(format!(
                        "fork '{}' has no target composite",
                        id
                    )));
                }
                Some(PseudoRole::Join) => {
                    if !automatic.contains_key(id) {
                        return Err(CoreError::definition(format!(
                            "join '{}' has no target",
                            id
                        )));
                    }
                    let fed = automatic
                        .iter()
                        .any(|(from, to)| to == id && regions.contains_key(from));
                    if !fed {
                        return Err(CoreError::definition(format!(
                            "join '{}' is not the completion target of any composite",
                            id
                        )));
                    }
                }
                _ => {}
            }
        }

        let json_bytes = serde_json::to_vec(&raw)?;
        let checksum = format!("{:08x}", crc32c::crc32c(&json_bytes));

        Ok(Self {
            name,
            initial: raw.initial.clone(),
            states,
            order,
            finals,
            transitions,
            automatic,
            regions,
            raw,
            checksum,
        })
    }

    /// Looks up an event-triggered transition.
    pub fn get_transition(&self, state: &StateId, event: &str) -> Option<&StateId> {
        self.transitions.get(&(state.clone(), event.to_string()))
    }

    /// Target of the automatic transition leaving a fork, composite or join.
    pub fn automatic_target(&self, state: &StateId) -> Option<&StateId> {
        self.automatic.get(state)
    }

    /// Regions of a composite, or `None` if the state is not a composite.
    pub fn regions(&self, state: &StateId) -> Option<&[Region]> {
        self.regions.get(state).map(|r| r.as_slice())
    }

    pub fn is_composite(&self, state: &StateId) -> bool {
        self.regions.contains_key(state)
    }

    pub fn state(&self, id: &StateId) -> Option<&StateInfo> {
        self.states.get(id)
    }

    /// Returns true if the given state is declared in this machine.
    pub fn has_state(&self, id: &StateId) -> bool {
        self.states.contains_key(id)
    }

    /// States in declaration order.
    pub fn states(&self) -> impl Iterator<Item = &StateInfo> {
        self.order.iter().map(move |id| &self.states[id])
    }

    pub fn is_final(&self, state: &StateId) -> bool {
        self.finals.contains(state)
    }

    pub fn finals(&self) -> impl Iterator<Item = &StateId> {
        self.finals.iter()
    }

    /// Returns all events accepted by the given state, sorted.
    pub fn events_from(&self, state: &StateId) -> Vec<&str> {
        let mut events: Vec<&str> = self
            .transitions
            .keys()
            .filter(|(s, _)| s == state)
            .map(|(_, e)| e.as_str())
            .collect();
        events.sort_unstable();
        events
    }

    /// Returns every action id referenced by entry or exit lists.
    pub fn action_ids(&self) -> HashSet<&str> {
        self.states
            .values()
            .flat_map(|s| s.entry.iter().chain(s.exit.iter()))
            .map(|a| a.as_str())
            .collect()
    }

    /// Returns the raw definition as JSON.
    pub fn to_json(&self) -> Result<serde_json::Value, CoreError> {
        Ok(serde_json::to_value(&self.raw)?)
    }
}

fn index_states(
    raw: &MachineDefinitionRaw,
) -> Result<(HashMap<StateId, StateInfo>, Vec<StateId>), CoreError> {
    let mut states = HashMap::new();
    let mut order = Vec::new();

    for decl in &raw.states {
        if decl.id.as_str().is_empty() {
            return Err(CoreError::definition("state id must not be empty"));
        }
        if states.contains_key(&decl.id) {
            return Err(CoreError::definition(format!(
                "state '{}' declared more than once",
                decl.id
            )));
        }
        if let Some(role) = decl.role {
            if !decl.entry.is_empty() || !decl.exit.is_empty() {
                return Err(CoreError::definition(format!(
                    "{} '{}' cannot declare entry or exit actions",
                    role, decl.id
                )));
            }
            if decl.kind != StateKind::Plain {
                return Err(CoreError::definition(format!(
                    "{} '{}' cannot be a region initial or end state",
                    role, decl.id
                )));
            }
        }

        let region = match &decl.parent {
            Some(_) => Some(
                decl.region
                    .clone()
                    .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            ),
            None => {
                if decl.region.is_some() {
                    return Err(CoreError::definition(format!(
                        "state '{}' names a region but has no parent",
                        decl.id
                    )));
                }
                if decl.kind != StateKind::Plain {
                    return Err(CoreError::definition(format!(
                        "state '{}' is marked initial/end but is not inside a composite",
                        decl.id
                    )));
                }
                None
            }
        };

        states.insert(
            decl.id.clone(),
            StateInfo {
                id: decl.id.clone(),
                kind: decl.kind,
                parent: decl.parent.clone(),
                region,
                role: decl.role,
                entry: decl.entry.clone(),
                exit: decl.exit.clone(),
            },
        );
        order.push(decl.id.clone());
    }

    Ok((states, order))
}

fn build_regions(
    states: &HashMap<StateId, StateInfo>,
    order: &[StateId],
) -> Result<HashMap<StateId, Vec<Region>>, CoreError> {
    let mut drafts: HashMap<StateId, Vec<RegionDraft>> = HashMap::new();
    let mut composites = Vec::new();

    for id in order {
        let info = &states[id];
        let (Some(parent), Some(region)) = (&info.parent, &info.region) else {
            continue;
        };

        let parent_info = states.get(parent).ok_or_else(|| {
            CoreError::definition(format!(
                "parent '{}' of state '{}' is not declared",
                parent, id
            ))
        })?;
        if parent_info.parent.is_some() {
            return Err(CoreError::definition(format!(
                "state '{}' is nested inside '{}', which is itself nested; only one level of composites is supported",
                id, parent
            )));
        }
        if let Some(role) = parent_info.role {
            return Err(CoreError::definition(format!(
                "parent '{}' of state '{}' is a {} pseudo-state",
                parent, id, role
            )));
        }
        if info.role.is_some() {
            return Err(CoreError::definition(format!(
                "pseudo-state '{}' cannot be nested",
                id
            )));
        }

        let regions = drafts.entry(parent.clone()).or_insert_with(|| {
            composites.push(parent.clone());
            Vec::new()
        });
        let idx = match regions.iter().position(|r| &r.name == region) {
            Some(idx) => idx,
            None => {
                regions.push(RegionDraft {
                    name: region.clone(),
                    initial: None,
                    ends: HashSet::new(),
                    states: Vec::new(),
                });
                regions.len() - 1
            }
        };
        let draft = &mut regions[idx];
        draft.states.push(id.clone());

        match info.kind {
            StateKind::Initial => {
                if let Some(existing) = &draft.initial {
                    return Err(CoreError::definition(format!(
                        "region '{}' of '{}' declares more than one initial state ('{}' and '{}')",
                        region, parent, existing, id
                    )));
                }
                draft.initial = Some(id.clone());
            }
            StateKind::End => {
                draft.ends.insert(id.clone());
            }
            StateKind::Plain => {}
        }
    }

    let mut regions = HashMap::new();
    for composite in composites {
        let mut built = Vec::new();
        for draft in drafts.remove(&composite).unwrap_or_default() {
            let initial = draft.initial.ok_or_else(|| {
                CoreError::definition(format!(
                    "region '{}' of '{}' has no initial state",
                    draft.name, composite
                ))
            })?;
            if draft.ends.is_empty() {
                return Err(CoreError::definition(format!(
                    "region '{}' of '{}' has no end state",
                    draft.name, composite
                )));
            }
            built.push(Region {
                name: draft.name,
                initial,
                ends: draft.ends,
                states: draft.states,
            });
        }
        regions.insert(composite, built);
    }

    Ok(regions)
}

fn validate_endpoints(
    raw: &MachineDefinitionRaw,
    states: &HashMap<StateId, StateInfo>,
    regions: &HashMap<StateId, Vec<Region>>,
) -> Result<HashSet<StateId>, CoreError> {
    let is_plain_top_level = |id: &StateId| {
        states
            .get(id)
            .map(|s| s.parent.is_none() && s.role.is_none() && !regions.contains_key(id))
    };

    match is_plain_top_level(&raw.initial) {
        None => {
            return Err(CoreError::definition(format!(
                "initial state '{}' not in states list",
                raw.initial
            )))
        }
        Some(false) => {
            return Err(CoreError::definition(format!(
                "initial state '{}' must be a plain top-level state",
                raw.initial
            )))
        }
        Some(true) => {}
    }

    if raw.finals.is_empty() {
        return Err(CoreError::definition("no final state declared"));
    }

    let mut finals = HashSet::new();
    for state in &raw.finals {
        match is_plain_top_level(state) {
            None => {
                return Err(CoreError::definition(format!(
                    "final state '{}' not in states list",
                    state
                )))
            }
            Some(false) => {
                return Err(CoreError::definition(format!(
                    "final state '{}' must be a plain top-level state",
                    state
                )))
            }
            Some(true) => {}
        }
        finals.insert(state.clone());
    }

    if finals.contains(&raw.initial) {
        return Err(CoreError::definition(format!(
            "initial state '{}' cannot also be final",
            raw.initial
        )));
    }

    Ok(finals)
}

type TransitionTables = (
    HashMap<(StateId, String), StateId>,
    HashMap<StateId, StateId>,
);

fn index_transitions(
    raw: &MachineDefinitionRaw,
    states: &HashMap<StateId, StateInfo>,
    regions: &HashMap<StateId, Vec<Region>>,
    finals: &HashSet<StateId>,
) -> Result<TransitionTables, CoreError> {
    let mut transitions = HashMap::new();
    let mut automatic = HashMap::new();

    for t in &raw.transitions {
        let target = states.get(&t.to).ok_or_else(|| {
            CoreError::definition(format!("transition target '{}' not in states list", t.to))
        })?;
        if t.from.is_empty() {
            return Err(CoreError::definition(format!(
                "transition to '{}' has no source state",
                t.to
            )));
        }

        for from in &t.from {
            let source = states.get(from).ok_or_else(|| {
                CoreError::definition(format!("transition source '{}' not in states list", from))
            })?;
            if finals.contains(from) {
                return Err(CoreError::definition(format!(
                    "final state '{}' cannot have outgoing transitions",
                    from
                )));
            }

            match &t.event {
                Some(event) => {
                    if event.is_empty() {
                        return Err(CoreError::definition(format!(
                            "transition from '{}' has an empty event",
                            from
                        )));
                    }
                    validate_evented(source, target, event)?;

                    let key = (from.clone(), event.clone());
                    if let Some(existing) = transitions.get(&key) {
                        let reason = if existing == &t.to {
                            format!("duplicate transition from '{}' on event '{}'", from, event)
                        } else {
                            format!(
                                "ambiguous transition from '{}' on event '{}': '{}' or '{}'",
                                from, event, existing, t.to
                            )
                        };
                        return Err(CoreError::definition(reason));
                    }
                    transitions.insert(key, t.to.clone());
                }
                None => {
                    validate_automatic(source, target, regions)?;
                    if automatic.contains_key(from) {
                        return Err(CoreError::definition(format!(
                            "state '{}' declares more than one automatic transition",
                            from
                        )));
                    }
                    automatic.insert(from.clone(), t.to.clone());
                }
            }
        }
    }

    Ok((transitions, automatic))
}

fn validate_evented(source: &StateInfo, target: &StateInfo, event: &str) -> Result<(), CoreError> {
    if let Some(role) = source.role {
        return Err(CoreError::definition(format!(
            "{} '{}' cannot have event-triggered transitions",
            role, source.id
        )));
    }
    if target.role == Some(PseudoRole::Join) {
        return Err(CoreError::definition(format!(
            "join '{}' can only be entered by a composite completing",
            target.id
        )));
    }

    match &source.parent {
        Some(parent) => {
            if target.parent.as_ref() != Some(parent) || target.region != source.region {
                return Err(CoreError::definition(format!(
                    "transition from '{}' on '{}' leaves region '{}' of '{}'",
                    source.id,
                    event,
                    source.region.as_deref().unwrap_or(DEFAULT_REGION),
                    parent
                )));
            }
        }
        None => {
            if let Some(parent) = &target.parent {
                return Err(CoreError::definition(format!(
                    "transition from '{}' on '{}' targets '{}' inside composite '{}'; enter the composite instead",
                    source.id, event, target.id, parent
                )));
            }
        }
    }

    Ok(())
}

fn validate_automatic(
    source: &StateInfo,
    target: &StateInfo,
    regions: &HashMap<StateId, Vec<Region>>,
) -> Result<(), CoreError> {
    let target_is_composite = regions.contains_key(&target.id);

    match source.role {
        Some(PseudoRole::Fork) => {
            if !target_is_composite {
                return Err(CoreError::definition(format!(
                    "fork '{}' must target a composite state, got '{}'",
                    source.id, target.id
                )));
            }
        }
        Some(PseudoRole::Join) => {
            let allowed = target.parent.is_none()
                && !target_is_composite
                && target.role != Some(PseudoRole::Join);
            if !allowed {
                return Err(CoreError::definition(format!(
                    "join '{}' must target a top-level state or fork, got '{}'",
                    source.id, target.id
                )));
            }
        }
        None if regions.contains_key(&source.id) => {
            let allowed = target.parent.is_none() && !target_is_composite;
            if !allowed {
                return Err(CoreError::definition(format!(
                    "completion transition of '{}' must target a join, fork or top-level state, got '{}'",
                    source.id, target.id
                )));
            }
        }
        None => {
            return Err(CoreError::definition(format!(
                "automatic transition from '{}' is only allowed for forks, joins and composites",
                source.id
            )));
        }
    }

    Ok(())
}
