//! Block model - the instruction tree built by the editor
//!
//! A [`Block`] is the loosely-typed form the editor produces and the program
//! store persists. [`validate`] checks it against the closed set of categories
//! and actions and, when it is clean, yields a [`Program`]: the typed tree with
//! every category default filled in. The executor only ever runs a `Program`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Block category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Arm,
    Wheel,
    Delay,
    Repeat,
}

impl BlockKind {
    /// Palette color used when the block is saved
    pub fn color(self) -> &'static str {
        match self {
            BlockKind::Arm => "purple",
            BlockKind::Wheel => "blue",
            BlockKind::Delay | BlockKind::Repeat => "amber",
        }
    }

    fn param_range(self, key: &str) -> Option<ParamRange> {
        let range = match (self, key) {
            (BlockKind::Arm, "time") => ParamRange::new(0.0, 60.0),
            (BlockKind::Wheel, "speed") => ParamRange::new(0.1, 0.3),
            (BlockKind::Wheel, "angle") => ParamRange::new(1.0, 360.0),
            (BlockKind::Wheel, "duration") => ParamRange::new(0.1, 60.0),
            (BlockKind::Delay, "seconds") => ParamRange::new(0.0, 3600.0),
            (BlockKind::Repeat, "times") => ParamRange::new(0.0, 1000.0),
            _ => return None,
        };
        Some(range)
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BlockKind::Arm => "arm",
            BlockKind::Wheel => "wheel",
            BlockKind::Delay => "delay",
            BlockKind::Repeat => "repeat",
        };
        f.write_str(name)
    }
}

/// Inclusive numeric range a parameter is clamped to by the editor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamRange {
    pub min: f64,
    pub max: f64,
}

impl ParamRange {
    const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

/// Named arm gestures understood by the robot's gesture topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gesture {
    Hi,
    Namaste,
    LHandUp,
    RHandUp,
    Home,
    HandsUp,
}

impl Gesture {
    pub const ALL: [Gesture; 6] = [
        Gesture::Hi,
        Gesture::Namaste,
        Gesture::LHandUp,
        Gesture::RHandUp,
        Gesture::Home,
        Gesture::HandsUp,
    ];

    /// Name published on the gesture topic
    pub fn as_str(self) -> &'static str {
        match self {
            Gesture::Hi => "Hi",
            Gesture::Namaste => "Namaste",
            Gesture::LHandUp => "LHandUp",
            Gesture::RHandUp => "RHandUp",
            Gesture::Home => "Home",
            Gesture::HandsUp => "HandsUp",
        }
    }

    pub fn parse(action: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|g| g.as_str() == action)
    }
}

/// Wheel primitives of the differential drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WheelMotion {
    MoveForward,
    MoveBackward,
    TurnLeft,
    TurnRight,
}

impl WheelMotion {
    pub const ALL: [WheelMotion; 4] = [
        WheelMotion::MoveForward,
        WheelMotion::MoveBackward,
        WheelMotion::TurnLeft,
        WheelMotion::TurnRight,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            WheelMotion::MoveForward => "MoveForward",
            WheelMotion::MoveBackward => "MoveBackward",
            WheelMotion::TurnLeft => "TurnLeft",
            WheelMotion::TurnRight => "TurnRight",
        }
    }

    /// Accepts both `MoveForward` and the palette label `Move Forward`
    pub fn parse(action: &str) -> Option<Self> {
        let compact: String = action.split_whitespace().collect();
        Self::ALL.into_iter().find(|m| m.as_str() == compact)
    }

    pub fn is_turn(self) -> bool {
        matches!(self, WheelMotion::TurnLeft | WheelMotion::TurnRight)
    }
}

impl fmt::Display for WheelMotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One node of an editor-built program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub kind: BlockKind,
    pub action: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Block>,
}

impl Block {
    pub fn new(kind: BlockKind, action: impl Into<String>) -> Self {
        Self {
            kind,
            action: action.into(),
            params: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    pub fn arm(gesture: Gesture) -> Self {
        Self::new(BlockKind::Arm, gesture.as_str())
    }

    pub fn wheel(motion: WheelMotion) -> Self {
        Self::new(BlockKind::Wheel, motion.as_str())
    }

    pub fn delay(seconds: f64) -> Self {
        Self::new(BlockKind::Delay, "Delay").with_param("seconds", seconds)
    }

    pub fn repeat(times: u32, children: Vec<Block>) -> Self {
        let mut block = Self::new(BlockKind::Repeat, "Repeat").with_param("times", f64::from(times));
        block.children = children;
        block
    }

    pub fn with_param(mut self, key: impl Into<String>, value: f64) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Clamp every recognized parameter into its valid range, recursively.
    ///
    /// This is the editing-boundary clamp; the executor never clamps.
    pub fn clamp_params(&mut self) {
        let kind = self.kind;
        for (key, value) in self.params.iter_mut() {
            if let Some(range) = kind.param_range(key) {
                if value.is_finite() {
                    *value = range.clamp(*value);
                    if key == "times" {
                        *value = value.round();
                    }
                }
            }
        }
        for child in &mut self.children {
            child.clamp_params();
        }
    }

    fn param(&self, key: &str) -> Option<f64> {
        self.params.get(key).copied()
    }
}

/// Typed, defaulted instruction produced by validation
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Arm {
        gesture: Gesture,
        /// Per-block wait in seconds, honored in parametrized timing mode
        time: Option<f64>,
    },
    Wheel {
        motion: WheelMotion,
        speed: f64,
        angle: f64,
        duration: Option<f64>,
    },
    Delay {
        seconds: f64,
    },
    Repeat {
        times: u32,
        body: Vec<Instruction>,
    },
}

impl Instruction {
    /// Short human-readable label used in logs and telemetry
    pub fn label(&self) -> String {
        match self {
            Instruction::Arm { gesture, .. } => format!("arm {}", gesture.as_str()),
            Instruction::Wheel { motion, .. } => format!("wheel {}", motion),
            Instruction::Delay { seconds } => format!("delay {}s", seconds),
            Instruction::Repeat { times, body } => {
                format!("repeat x{} ({} blocks)", times, body.len())
            }
        }
    }
}

/// A validated program, ready to run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    instructions: Vec<Instruction>,
}

impl Program {
    /// Validate `blocks` and build the typed program in one step
    pub fn from_blocks(blocks: &[Block]) -> Result<Self, ValidationError> {
        validate(blocks).into_program()
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

/// What is wrong with a block
#[derive(Debug, Clone, PartialEq)]
pub enum ViolationKind {
    UnknownAction { kind: BlockKind, action: String },
    UnknownParam { kind: BlockKind, key: String },
    NonFiniteParam { key: String },
    InvalidRepeatCount(f64),
    UnexpectedChildren { kind: BlockKind },
}

/// A violation located by its index path from the program root
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub path: Vec<usize>,
    pub kind: ViolationKind,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path: Vec<String> = self.path.iter().map(|i| i.to_string()).collect();
        write!(f, "block [{}]: ", path.join("."))?;
        match &self.kind {
            ViolationKind::UnknownAction { kind, action } => {
                write!(f, "unknown {} action '{}'", kind, action)
            }
            ViolationKind::UnknownParam { kind, key } => {
                write!(f, "parameter '{}' is not recognized for {} blocks", key, kind)
            }
            ViolationKind::NonFiniteParam { key } => {
                write!(f, "parameter '{}' is not a finite number", key)
            }
            ViolationKind::InvalidRepeatCount(times) => {
                write!(f, "repeat count {} is not a non-negative integer", times)
            }
            ViolationKind::UnexpectedChildren { kind } => {
                write!(f, "{} blocks cannot contain children", kind)
            }
        }
    }
}

/// Program rejected before any run starts
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{}", summarize(.violations))]
pub struct ValidationError {
    pub violations: Vec<Violation>,
}

fn summarize(violations: &[Violation]) -> String {
    let lines: Vec<String> = violations.iter().map(|v| v.to_string()).collect();
    format!("{} violation(s): {}", violations.len(), lines.join("; "))
}

/// Outcome of [`validate`]
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub violations: Vec<Violation>,
    program: Program,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn into_program(self) -> Result<Program, ValidationError> {
        if self.violations.is_empty() {
            Ok(self.program)
        } else {
            Err(ValidationError { violations: self.violations })
        }
    }
}

/// Check a block tree without mutating it
pub fn validate(blocks: &[Block]) -> ValidationResult {
    let mut violations = Vec::new();
    let mut path = Vec::new();
    let instructions = check_sequence(blocks, &mut path, &mut violations);
    ValidationResult {
        violations,
        program: Program { instructions },
    }
}

fn check_sequence(
    blocks: &[Block],
    path: &mut Vec<usize>,
    violations: &mut Vec<Violation>,
) -> Vec<Instruction> {
    let mut instructions = Vec::with_capacity(blocks.len());
    for (index, block) in blocks.iter().enumerate() {
        path.push(index);
        if let Some(instruction) = check_block(block, path, violations) {
            instructions.push(instruction);
        }
        path.pop();
    }
    instructions
}

fn check_block(
    block: &Block,
    path: &mut Vec<usize>,
    violations: &mut Vec<Violation>,
) -> Option<Instruction> {
    let mut violate = |kind: ViolationKind, path: &[usize]| {
        violations.push(Violation { path: path.to_vec(), kind });
    };

    for (key, value) in &block.params {
        if block.kind.param_range(key).is_none() {
            violate(
                ViolationKind::UnknownParam { kind: block.kind, key: key.clone() },
                path,
            );
        } else if !value.is_finite() {
            violate(ViolationKind::NonFiniteParam { key: key.clone() }, path);
        }
    }

    if block.kind != BlockKind::Repeat && !block.children.is_empty() {
        violate(ViolationKind::UnexpectedChildren { kind: block.kind }, path);
    }

    let unknown_action = || ViolationKind::UnknownAction {
        kind: block.kind,
        action: block.action.clone(),
    };

    match block.kind {
        BlockKind::Arm => match Gesture::parse(&block.action) {
            Some(gesture) => Some(Instruction::Arm {
                gesture,
                time: block.param("time"),
            }),
            None => {
                violate(unknown_action(), path);
                None
            }
        },
        BlockKind::Wheel => match WheelMotion::parse(&block.action) {
            Some(motion) => Some(Instruction::Wheel {
                motion,
                speed: block.param("speed").unwrap_or(0.3),
                angle: block.param("angle").unwrap_or(90.0),
                duration: block.param("duration"),
            }),
            None => {
                violate(unknown_action(), path);
                None
            }
        },
        BlockKind::Delay => {
            if block.action != "Delay" {
                violate(unknown_action(), path);
                return None;
            }
            Some(Instruction::Delay {
                seconds: block.param("seconds").unwrap_or(1.0),
            })
        }
        BlockKind::Repeat => {
            if block.action != "Repeat" {
                violate(unknown_action(), path);
            }
            let raw_times = block.param("times").unwrap_or(1.0);
            let times = if raw_times.is_finite() && raw_times >= 0.0 && raw_times.fract() == 0.0 {
                Some(raw_times as u32)
            } else {
                if raw_times.is_finite() {
                    violate(ViolationKind::InvalidRepeatCount(raw_times), path);
                }
                None
            };
            let body = check_sequence(&block.children, path, violations);
            if block.action != "Repeat" {
                return None;
            }
            times.map(|times| Instruction::Repeat { times, body })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_filled() {
        let blocks = vec![
            Block::wheel(WheelMotion::MoveForward),
            Block::wheel(WheelMotion::TurnLeft),
            Block::new(BlockKind::Delay, "Delay"),
            Block::new(BlockKind::Repeat, "Repeat"),
        ];
        let program = Program::from_blocks(&blocks).unwrap();
        assert_eq!(
            program.instructions(),
            &[
                Instruction::Wheel {
                    motion: WheelMotion::MoveForward,
                    speed: 0.3,
                    angle: 90.0,
                    duration: None,
                },
                Instruction::Wheel {
                    motion: WheelMotion::TurnLeft,
                    speed: 0.3,
                    angle: 90.0,
                    duration: None,
                },
                Instruction::Delay { seconds: 1.0 },
                Instruction::Repeat { times: 1, body: vec![] },
            ]
        );
        // defaults live in the program, not the caller's tree
        assert!(blocks[0].params.is_empty());
    }

    #[test]
    fn test_unknown_wheel_action_rejected() {
        let blocks = vec![
            Block::wheel(WheelMotion::MoveForward),
            Block::new(BlockKind::Wheel, "Strafe"),
        ];
        let result = validate(&blocks);
        assert!(!result.is_valid());
        assert_eq!(
            result.violations,
            vec![Violation {
                path: vec![1],
                kind: ViolationKind::UnknownAction {
                    kind: BlockKind::Wheel,
                    action: "Strafe".to_string()
                },
            }]
        );
    }

    #[test]
    fn test_palette_labels_accepted() {
        let blocks = vec![
            Block::new(BlockKind::Wheel, "Move Backward"),
            Block::new(BlockKind::Wheel, "Turn Right").with_param("angle", 45.0),
            Block::new(BlockKind::Arm, "Namaste"),
        ];
        let program = Program::from_blocks(&blocks).unwrap();
        assert_eq!(program.len(), 3);
    }

    #[test]
    fn test_gesture_is_not_a_wheel_action() {
        let blocks = vec![Block::new(BlockKind::Wheel, "Hi")];
        assert!(Program::from_blocks(&blocks).is_err());
    }

    #[test]
    fn test_nested_violation_path() {
        let blocks = vec![
            Block::delay(1.0),
            Block::repeat(2, vec![
                Block::arm(Gesture::Hi),
                Block::repeat(1, vec![Block::new(BlockKind::Arm, "Wave")]),
            ]),
        ];
        let err = Program::from_blocks(&blocks).unwrap_err();
        assert_eq!(err.violations.len(), 1);
        assert_eq!(err.violations[0].path, vec![1, 1, 0]);
        assert!(err.to_string().contains("unknown arm action 'Wave'"));
    }

    #[test]
    fn test_param_and_structure_violations() {
        let mut delay_with_child = Block::delay(1.0);
        delay_with_child.children.push(Block::arm(Gesture::Home));
        let blocks = vec![
            Block::wheel(WheelMotion::MoveForward).with_param("seconds", 2.0),
            Block::repeat(1, vec![]).with_param("times", 2.5),
            Block::new(BlockKind::Repeat, "Repeat").with_param("times", -1.0),
            Block::delay(f64::NAN),
            delay_with_child,
        ];
        let result = validate(&blocks);
        let kinds: Vec<&ViolationKind> = result.violations.iter().map(|v| &v.kind).collect();
        assert!(kinds.contains(&&ViolationKind::UnknownParam {
            kind: BlockKind::Wheel,
            key: "seconds".to_string()
        }));
        assert!(kinds.contains(&&ViolationKind::InvalidRepeatCount(2.5)));
        assert!(kinds.contains(&&ViolationKind::InvalidRepeatCount(-1.0)));
        assert!(kinds.contains(&&ViolationKind::NonFiniteParam { key: "seconds".to_string() }));
        assert!(kinds.contains(&&ViolationKind::UnexpectedChildren { kind: BlockKind::Delay }));
    }

    #[test]
    fn test_zero_times_is_valid() {
        let blocks = vec![Block::repeat(0, vec![Block::arm(Gesture::Hi)])];
        let program = Program::from_blocks(&blocks).unwrap();
        assert!(matches!(program.instructions()[0], Instruction::Repeat { times: 0, .. }));
    }

    #[test]
    fn test_clamp_params() {
        let mut block = Block::repeat(
            5000,
            vec![
                Block::wheel(WheelMotion::MoveForward).with_param("speed", 0.9),
                Block::wheel(WheelMotion::TurnLeft).with_param("angle", 0.0),
            ],
        );
        block.clamp_params();
        assert_eq!(block.params["times"], 1000.0);
        assert_eq!(block.children[0].params["speed"], 0.3);
        assert_eq!(block.children[1].params["angle"], 1.0);
    }

    #[test]
    fn test_block_json_shape() {
        let json = r#"[
            {"kind": "wheel", "action": "MoveForward", "params": {"duration": 2}},
            {"kind": "repeat", "action": "Repeat", "params": {"times": 2},
             "children": [{"kind": "arm", "action": "Hi"}]}
        ]"#;
        let blocks: Vec<Block> = serde_json::from_str(json).unwrap();
        assert_eq!(blocks[1].children[0], Block::arm(Gesture::Hi));
        assert!(validate(&blocks).is_valid());

        let unknown_kind = r#"[{"kind": "leg", "action": "Kick"}]"#;
        assert!(serde_json::from_str::<Vec<Block>>(unknown_kind).is_err());
    }
}
