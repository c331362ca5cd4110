//! Dynamic teaming and flow control -- team formation from a pool of agent
//! profiles, turn-taking policies, and a distributed swarm simulation.

use serde::{Deserialize, Serialize};

use crate::ids::{now_epoch, short_id};
use crate::swarm::{SwarmMode, SwarmResult, TaskAnalysis, TaskAnalyzer, TaskComplexity};

/// Describes a single agent in the distributed grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Unique agent id.
    pub agent_id: String,
    /// Node the agent runs on.
    pub node_id: String,
    /// Role label (`planner`, `executor`, `validator`, `specialist`).
    pub role: String,
    /// Capability words matched against task domains.
    pub capabilities: Vec<String>,
    /// Trust in 0–1; drives lead selection.
    pub trust_level: f64,
    /// Whether the agent is local to this process.
    pub is_local: bool,
}

/// A formed team ready to execute a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamFormation {
    /// Team id.
    pub team_id: String,
    /// Selected agents.
    pub agents: Vec<AgentProfile>,
    /// Agent designated as lead.
    pub lead_agent_id: String,
    /// Strategy label (a [`SwarmMode`] name).
    pub strategy: String,
    /// Epoch seconds at formation.
    pub created_at: f64,
}

/// A turn in a simulated multi-agent conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationEntry {
    /// Speaking agent.
    pub agent_id: String,
    /// Speaker's role.
    pub role: String,
    /// Turn content.
    pub content: String,
}

// ── Flow control ────────────────────────────────────────────────

/// Conversation flow policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowPolicy {
    /// Cycle through agents in order.
    RoundRobin,
    /// Lead speaks first, then trust-ordered others.
    LeadFirst,
    /// Pick the agent whose capabilities best match the conversation.
    CapabilityMatch,
    /// Alternate between agents of different roles.
    Debate,
}

/// Controls turn-taking among agents under a chosen policy.
pub struct FlowController {
    policy: FlowPolicy,
    agents: Vec<AgentProfile>,
}

impl FlowController {
    /// Controller over a policy and agent roster.
    pub fn new(policy: FlowPolicy, agents: Vec<AgentProfile>) -> Self {
        Self { policy, agents }
    }

    /// Pick the next speaker. Returns `None` only for an empty roster.
    pub fn next_speaker(&self, conversation: &[ConversationEntry]) -> Option<&AgentProfile> {
        if self.agents.is_empty() {
            return None;
        }
        match self.policy {
            FlowPolicy::RoundRobin => self.round_robin(conversation),
            FlowPolicy::LeadFirst => self.lead_first(conversation),
            FlowPolicy::CapabilityMatch => self.capability_match(conversation),
            FlowPolicy::Debate => self.debate(conversation),
        }
    }

    /// Stop once `turns / agents >= max_rounds`.
    pub fn should_conclude(&self, conversation: &[ConversationEntry], max_rounds: usize) -> bool {
        if self.agents.is_empty() {
            return true;
        }
        let rounds = conversation
            .len()
            .checked_div(self.agents.len())
            .unwrap_or(usize::MAX);
        rounds >= max_rounds
    }

    fn round_robin(&self, conversation: &[ConversationEntry]) -> Option<&AgentProfile> {
        let idx = conversation
            .len()
            .checked_rem(self.agents.len())
            .unwrap_or(0);
        self.agents.get(idx)
    }

    fn lead_first(&self, conversation: &[ConversationEntry]) -> Option<&AgentProfile> {
        if conversation.is_empty() {
            return self
                .agents
                .iter()
                .max_by(|a, b| total_cmp(a.trust_level, b.trust_level));
        }
        let mut by_trust: Vec<&AgentProfile> = self.agents.iter().collect();
        by_trust.sort_by(|a, b| total_cmp(b.trust_level, a.trust_level));
        let idx = conversation
            .len()
            .saturating_sub(1)
            .checked_rem(by_trust.len())
            .unwrap_or(0);
        by_trust.get(idx).copied()
    }

    fn capability_match(&self, conversation: &[ConversationEntry]) -> Option<&AgentProfile> {
        let mut words: std::collections::HashSet<String> = std::collections::HashSet::new();
        for turn in conversation {
            words.extend(turn.content.to_lowercase().split_whitespace().map(str::to_owned));
        }
        self.agents.iter().max_by_key(|agent| {
            agent
                .capabilities
                .iter()
                .filter(|cap| words.contains(&cap.to_lowercase()))
                .count()
        })
    }

    fn debate(&self, conversation: &[ConversationEntry]) -> Option<&AgentProfile> {
        let Some(last) = conversation.last() else {
            return self.agents.first();
        };
        let last_role = self
            .agents
            .iter()
            .find(|a| a.agent_id == last.agent_id)
            .map(|a| a.role.as_str())
            .unwrap_or("");
        self.agents
            .iter()
            .find(|a| a.role != last_role)
            .or_else(|| self.round_robin(conversation))
    }
}

fn total_cmp(a: f64, b: f64) -> std::cmp::Ordering {
    a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal)
}

// ── Team builder ────────────────────────────────────────────────

/// Forms and dissolves teams from a pool of available agents.
pub struct TeamBuilder {
    available_agents: Vec<AgentProfile>,
    active_teams: std::collections::HashMap<String, TeamFormation>,
}

impl TeamBuilder {
    /// Builder over an agent pool.
    pub fn new(available_agents: Vec<AgentProfile>) -> Self {
        Self {
            available_agents,
            active_teams: std::collections::HashMap::new(),
        }
    }

    /// Replace the available agent pool.
    pub fn set_available_agents(&mut self, agents: Vec<AgentProfile>) {
        self.available_agents = agents;
    }

    /// Select up to `max_size` agents by capability/domain overlap (ties by
    /// trust), pick the highest-trust selected agent as lead, and derive a
    /// strategy from the task complexity.
    pub fn form_team(&mut self, analysis: &TaskAnalysis, max_size: usize) -> TeamFormation {
        let mut scored: Vec<(usize, &AgentProfile)> = self
            .available_agents
            .iter()
            .map(|agent| {
                let score = agent
                    .capabilities
                    .iter()
                    .filter(|cap| analysis.domains.contains(*cap))
                    .count();
                (score, agent)
            })
            .collect();
        scored.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then_with(|| total_cmp(b.1.trust_level, a.1.trust_level))
        });

        let selected: Vec<AgentProfile> = scored
            .into_iter()
            .take(max_size)
            .map(|(_, agent)| agent.clone())
            .collect();

        let lead_agent_id = selected
            .iter()
            .max_by(|a, b| total_cmp(a.trust_level, b.trust_level))
            .map(|a| a.agent_id.clone())
            .unwrap_or_default();

        let team = TeamFormation {
            team_id: short_id(),
            agents: selected,
            lead_agent_id,
            strategy: pick_strategy(analysis.complexity).as_str().to_owned(),
            created_at: now_epoch(),
        };
        self.active_teams.insert(team.team_id.clone(), team.clone());
        team
    }

    /// Remove a team from the active roster.
    pub fn dissolve_team(&mut self, team_id: &str) {
        self.active_teams.remove(team_id);
    }

    /// Snapshot of active teams.
    pub fn active_teams(&self) -> Vec<&TeamFormation> {
        self.active_teams.values().collect()
    }
}

/// Map task complexity to a swarm strategy.
fn pick_strategy(complexity: TaskComplexity) -> SwarmMode {
    match complexity {
        TaskComplexity::Trivial | TaskComplexity::Simple => SwarmMode::Sequential,
        TaskComplexity::Moderate => SwarmMode::LeadSupport,
        TaskComplexity::Complex => SwarmMode::Parallel,
        TaskComplexity::Expert => SwarmMode::Specialist,
    }
}

/// Map a strategy name to a flow policy.
fn strategy_to_policy(strategy: &str) -> FlowPolicy {
    match strategy {
        "red_blue" | "ping_pong" => FlowPolicy::Debate,
        "lead_support" => FlowPolicy::LeadFirst,
        "specialist" => FlowPolicy::CapabilityMatch,
        _ => FlowPolicy::RoundRobin,
    }
}

// ── Distributed swarm engine ────────────────────────────────────

/// Simulated conversation rounds per distributed run.
const MAX_ROUNDS: usize = 5;

/// Team formation plus flow control over a simulated conversation.
pub struct DistributedSwarmEngine {
    team_builder: TeamBuilder,
    analyzer: TaskAnalyzer,
}

impl DistributedSwarmEngine {
    /// Engine over a team builder.
    pub fn new(team_builder: TeamBuilder) -> Self {
        Self {
            team_builder,
            analyzer: TaskAnalyzer,
        }
    }

    /// Analyze the task, form a team, simulate the conversation under the
    /// strategy's flow policy, and aggregate the result.
    pub fn run_distributed(
        &mut self,
        user_input: &str,
        available_agents: Vec<AgentProfile>,
    ) -> SwarmResult {
        let analysis = self.analyzer.analyze(user_input);
        self.team_builder.set_available_agents(available_agents);
        let team = self.team_builder.form_team(&analysis, 4);

        let policy = strategy_to_policy(&team.strategy);
        let controller = FlowController::new(policy, team.agents.clone());

        let mut conversation: Vec<ConversationEntry> = Vec::new();
        while !controller.should_conclude(&conversation, MAX_ROUNDS) {
            let Some(speaker) = controller.next_speaker(&conversation) else {
                break;
            };
            conversation.push(ConversationEntry {
                agent_id: speaker.agent_id.clone(),
                role: speaker.role.clone(),
                content: format!("[{}] Response to: {user_input}", speaker.role),
            });
        }

        let output = if conversation.is_empty() {
            format!("Processed: {user_input}")
        } else {
            conversation
                .iter()
                .map(|t| t.content.clone())
                .collect::<Vec<_>>()
                .join("\n")
        };

        let mode = resolve_mode(&team.strategy);
        SwarmResult {
            mode,
            output,
            metadata: serde_json::json!({
                "team_id": team.team_id,
                "lead_agent_id": team.lead_agent_id,
                "agents": team.agents.iter().map(|a| a.agent_id.clone()).collect::<Vec<_>>(),
                "conversation_turns": conversation.len(),
                "strategy": team.strategy,
            }),
        }
    }
}

/// Convert a strategy name back to a mode, defaulting to sequential.
fn resolve_mode(strategy: &str) -> SwarmMode {
    match strategy {
        "parallel" => SwarmMode::Parallel,
        "red_blue" => SwarmMode::RedBlue,
        "ping_pong" => SwarmMode::PingPong,
        "lead_support" => SwarmMode::LeadSupport,
        "specialist" => SwarmMode::Specialist,
        _ => SwarmMode::Sequential,
    }
}
