//! 单轮状态机：Idle → ToolSelection → ToolExecution (0..n) → FinalGeneration → Done，Error 可由任一阶段进入

use serde::Serialize;

/// 编排器当前所处阶段
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    #[default]
    Idle,
    ToolSelection,
    ToolExecution,
    FinalGeneration,
    Done,
    Error,
}

impl TurnPhase {
    /// 判断阶段迁移是否合法；新一轮总是从 Idle / Done / Error 重新开始
    pub fn can_transition(self, next: TurnPhase) -> bool {
        use TurnPhase::*;
        match (self, next) {
            (_, Error) => true,
            (Idle | Done | Error, ToolSelection) => true,
            (ToolSelection, ToolExecution | FinalGeneration | Done) => true,
            (ToolExecution, ToolExecution | ToolSelection | FinalGeneration) => true,
            (FinalGeneration, Done) => true,
            (Done | Error, Idle) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let path = [
            TurnPhase::Idle,
            TurnPhase::ToolSelection,
            TurnPhase::ToolExecution,
            TurnPhase::ToolExecution,
            TurnPhase::FinalGeneration,
            TurnPhase::Done,
        ];
        for w in path.windows(2) {
            assert!(w[0].can_transition(w[1]), "{:?} -> {:?}", w[0], w[1]);
        }
    }

    #[test]
    fn test_error_reachable_and_no_skipping() {
        assert!(TurnPhase::ToolExecution.can_transition(TurnPhase::Error));
        assert!(TurnPhase::Idle.can_transition(TurnPhase::Error));
        assert!(!TurnPhase::Idle.can_transition(TurnPhase::FinalGeneration));
        assert!(!TurnPhase::Done.can_transition(TurnPhase::ToolExecution));
    }
}
