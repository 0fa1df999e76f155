// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Agent lifecycle state machine.
//!
//! A pure transition table over (state, event) pairs. The machine itself is
//! stateless: transition maps are built once at construction and never
//! mutated, so a single `LifecycleMachine` value can be shared by reference
//! across the lifecycle handlers.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Stopped,
    Active,
    Paused,
    ErrorRecovery,
}

impl AgentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentState::Stopped => "stopped",
            AgentState::Active => "active",
            AgentState::Paused => "paused",
            AgentState::ErrorRecovery => "error_recovery",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "stopped" => Some(AgentState::Stopped),
            "active" => Some(AgentState::Active),
            "paused" => Some(AgentState::Paused),
            "error_recovery" => Some(AgentState::ErrorRecovery),
            _ => None,
        }
    }

    /// Only `active` agents process domain events.
    pub fn is_processing(&self) -> bool {
        matches!(self, AgentState::Active)
    }
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleEvent {
    Start,
    Pause,
    Resume,
    Stop,
    Reconfigure,
    EnterErrorRecovery,
    Recover,
}

impl LifecycleEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleEvent::Start => "START",
            LifecycleEvent::Pause => "PAUSE",
            LifecycleEvent::Resume => "RESUME",
            LifecycleEvent::Stop => "STOP",
            LifecycleEvent::Reconfigure => "RECONFIGURE",
            LifecycleEvent::EnterErrorRecovery => "ENTER_ERROR_RECOVERY",
            LifecycleEvent::Recover => "RECOVER",
        }
    }
}

impl std::fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable transition table plus the administrative command-name side table.
pub struct LifecycleMachine {
    transitions: HashMap<(AgentState, LifecycleEvent), AgentState>,
    commands: HashMap<&'static str, LifecycleEvent>,
}

impl LifecycleMachine {
    pub fn new() -> Self {
        use AgentState::*;
        use LifecycleEvent::*;

        let transitions = HashMap::from([
            ((Stopped, Start), Active),
            ((Active, Pause), Paused),
            ((Active, Stop), Stopped),
            ((Active, EnterErrorRecovery), ErrorRecovery),
            ((Active, Reconfigure), Active),
            ((Paused, Resume), Active),
            ((Paused, Stop), Stopped),
            ((Paused, Reconfigure), Active),
            ((ErrorRecovery, Recover), Active),
            ((ErrorRecovery, Stop), Stopped),
        ]);

        let commands = HashMap::from([
            ("StartAgent", Start),
            ("PauseAgent", Pause),
            ("ResumeAgent", Resume),
            ("StopAgent", Stop),
            ("ReconfigureAgent", Reconfigure),
        ]);

        Self { transitions, commands }
    }

    /// Pure transition function. `None` means the pair is not in the table;
    /// callers turn that into a structured rejection, never a panic.
    pub fn transition(&self, state: AgentState, event: LifecycleEvent) -> Option<AgentState> {
        self.transitions.get(&(state, event)).copied()
    }

    /// Events that have a transition defined from `state`.
    pub fn valid_events(&self, state: AgentState) -> Vec<LifecycleEvent> {
        let mut events: Vec<LifecycleEvent> = self
            .transitions
            .keys()
            .filter(|(from, _)| *from == state)
            .map(|(_, event)| *event)
            .collect();
        events.sort_by_key(|e| e.as_str());
        events
    }

    /// Map an administrative command name to its lifecycle event.
    pub fn command_event(&self, command: &str) -> Option<LifecycleEvent> {
        self.commands.get(command).copied()
    }
}

impl Default for LifecycleMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use AgentState::*;
    use LifecycleEvent::*;

    const ALL_STATES: [AgentState; 4] = [Stopped, Active, Paused, ErrorRecovery];
    const ALL_EVENTS: [LifecycleEvent; 7] =
        [Start, Pause, Resume, Stop, Reconfigure, EnterErrorRecovery, Recover];

    #[test]
    fn defined_transitions_match_table() {
        let machine = LifecycleMachine::new();

        assert_eq!(machine.transition(Stopped, Start), Some(Active));
        assert_eq!(machine.transition(Active, Pause), Some(Paused));
        assert_eq!(machine.transition(Active, Stop), Some(Stopped));
        assert_eq!(machine.transition(Active, EnterErrorRecovery), Some(ErrorRecovery));
        assert_eq!(machine.transition(Active, Reconfigure), Some(Active));
        assert_eq!(machine.transition(Paused, Resume), Some(Active));
        assert_eq!(machine.transition(Paused, Stop), Some(Stopped));
        assert_eq!(machine.transition(Paused, Reconfigure), Some(Active));
        assert_eq!(machine.transition(ErrorRecovery, Recover), Some(Active));
        assert_eq!(machine.transition(ErrorRecovery, Stop), Some(Stopped));
    }

    #[test]
    fn every_pair_absent_from_table_is_invalid() {
        let machine = LifecycleMachine::new();
        let defined = [
            (Stopped, Start),
            (Active, Pause),
            (Active, Stop),
            (Active, EnterErrorRecovery),
            (Active, Reconfigure),
            (Paused, Resume),
            (Paused, Stop),
            (Paused, Reconfigure),
            (ErrorRecovery, Recover),
            (ErrorRecovery, Stop),
        ];

        for state in ALL_STATES {
            for event in ALL_EVENTS {
                if defined.contains(&(state, event)) {
                    assert!(machine.transition(state, event).is_some());
                } else {
                    assert_eq!(machine.transition(state, event), None, "{state} + {event}");
                }
            }
        }
    }

    #[test]
    fn stop_is_reachable_from_every_non_stopped_state() {
        let machine = LifecycleMachine::new();
        for state in [Active, Paused, ErrorRecovery] {
            assert_eq!(machine.transition(state, Stop), Some(Stopped));
        }
        assert_eq!(machine.transition(Stopped, Stop), None);
    }

    #[test]
    fn valid_events_for_paused() {
        let machine = LifecycleMachine::new();
        let events = machine.valid_events(Paused);
        assert_eq!(events, vec![Reconfigure, Resume, Stop]);
    }

    #[test]
    fn command_side_table_covers_the_five_admin_commands() {
        let machine = LifecycleMachine::new();
        assert_eq!(machine.command_event("StartAgent"), Some(Start));
        assert_eq!(machine.command_event("PauseAgent"), Some(Pause));
        assert_eq!(machine.command_event("ResumeAgent"), Some(Resume));
        assert_eq!(machine.command_event("StopAgent"), Some(Stop));
        assert_eq!(machine.command_event("ReconfigureAgent"), Some(Reconfigure));
        assert_eq!(machine.command_event("DeployAgent"), None);
    }

    #[test]
    fn only_active_is_a_processing_state() {
        assert!(Active.is_processing());
        for state in [Stopped, Paused, ErrorRecovery] {
            assert!(!state.is_processing());
        }
    }
}
