//! Stockfish engine wrapper using UCI protocol (async I/O)
//!
//! One engine process lives for the duration of one game's reanalysis and is
//! terminated when that game finishes, on success and failure alike.

use serde_json::{Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use tracing::debug;

use crate::error::WorkerError;

/// One ranked line from multi-PV analysis
#[derive(Debug, Clone, Default)]
pub struct PvLine {
    /// First move of the principal variation, UCI notation
    pub first: Option<String>,
    /// Centipawn score, side-to-move perspective
    pub cp: Option<i32>,
    /// Mate in N moves, side-to-move perspective
    pub mate: Option<i32>,
}

impl PvLine {
    /// True when the engine never reported this rank (fewer legal moves
    /// than lines requested).
    pub fn is_empty(&self) -> bool {
        self.first.is_none() && self.cp.is_none() && self.mate.is_none()
    }
}

/// Multi-line analysis output for one position
#[derive(Debug, Clone)]
pub struct TopLines {
    /// Ranked lines, index 0 = engine's preferred move
    pub lines: Vec<PvLine>,
    /// Node count the engine reported consulting
    pub nodes: Option<i64>,
}

/// Single-line analysis output
#[derive(Debug, Clone)]
pub struct BestEval {
    pub cp: Option<i32>,
    pub mate: Option<i32>,
}

/// Stockfish engine instance
#[derive(Debug)]
pub struct StockfishEngine {
    process: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl StockfishEngine {
    /// Spawn a new Stockfish process, initialize UCI and apply the
    /// configured options verbatim.
    pub async fn new(path: &str, options: &Map<String, Value>) -> Result<Self, WorkerError> {
        let mut process = Command::new(path)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(|e| WorkerError::Stockfish(format!("Failed to spawn Stockfish: {e}")))?;

        let stdin = process.stdin.take().unwrap();
        let stdout = BufReader::new(process.stdout.take().unwrap());

        let mut engine = Self {
            process,
            stdin,
            stdout,
        };

        // Initialize UCI
        engine.send("uci").await?;
        engine.wait_for("uciok").await?;

        engine.send("setoption name UCI_AnalyseMode value true").await?;
        for (name, value) in options {
            let value = option_value(value);
            engine
                .send(&format!("setoption name {name} value {value}"))
                .await?;
        }
        engine.send("isready").await?;
        engine.wait_for("readyok").await?;

        Ok(engine)
    }

    /// Send a command to Stockfish
    async fn send(&mut self, cmd: &str) -> Result<(), WorkerError> {
        debug!(cmd, "SF <");
        self.stdin
            .write_all(format!("{cmd}\n").as_bytes())
            .await
            .map_err(|e| WorkerError::Stockfish(format!("Failed to write to Stockfish: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| WorkerError::Stockfish(format!("Failed to flush stdin: {e}")))?;
        Ok(())
    }

    /// Read one response line, failing if the engine closed its stdout.
    /// A dead process reports EOF forever; looping on it would hang the
    /// worker instead of surfacing a per-game failure.
    async fn next_line(&mut self, line: &mut String) -> Result<(), WorkerError> {
        line.clear();
        let n = self
            .stdout
            .read_line(line)
            .await
            .map_err(|e| WorkerError::Stockfish(format!("Failed to read from Stockfish: {e}")))?;
        if n == 0 {
            return Err(WorkerError::Stockfish("Engine closed stdout".to_string()));
        }
        Ok(())
    }

    /// Wait for a specific response line
    async fn wait_for(&mut self, expected: &str) -> Result<(), WorkerError> {
        let mut line = String::new();
        loop {
            self.next_line(&mut line).await?;
            let trimmed = line.trim();
            debug!(line = trimmed, "SF >");
            if trimmed == expected {
                return Ok(());
            }
        }
    }

    /// Analyze a position with `line_count` ranked lines under a node budget.
    pub async fn analyze_top(
        &mut self,
        fen: &str,
        nodes: u32,
        line_count: u32,
    ) -> Result<TopLines, WorkerError> {
        self.send(&format!("setoption name MultiPV value {line_count}")).await?;
        self.send(&format!("position fen {fen}")).await?;
        self.send(&format!("go nodes {nodes}")).await?;

        let mut result = TopLines {
            lines: vec![PvLine::default(); line_count as usize],
            nodes: None,
        };
        let mut line = String::new();

        loop {
            self.next_line(&mut line).await?;
            let trimmed = line.trim();

            if trimmed.starts_with("info") && trimmed.contains(" pv ") {
                let pv_idx = pv_slot(trimmed);
                if pv_idx < result.lines.len() {
                    let entry = &mut result.lines[pv_idx];
                    entry.cp = parse_cp(trimmed);
                    entry.mate = parse_mate(trimmed);
                    entry.first = parse_pv(trimmed).into_iter().next();
                }
                if let Some(n) = parse_nodes(trimmed) {
                    result.nodes = Some(n);
                }
            } else if trimmed.starts_with("bestmove") {
                break;
            }
        }

        // Reset MultiPV to 1
        self.send("setoption name MultiPV value 1").await?;

        Ok(result)
    }

    /// Analyze a position for its single best line under a node budget.
    pub async fn analyze_best(&mut self, fen: &str, nodes: u32) -> Result<BestEval, WorkerError> {
        self.send(&format!("position fen {fen}")).await?;
        self.send(&format!("go nodes {nodes}")).await?;

        let mut result = BestEval { cp: None, mate: None };
        let mut line = String::new();

        loop {
            self.next_line(&mut line).await?;
            let trimmed = line.trim();

            if trimmed.starts_with("info") && trimmed.contains(" pv ") {
                if let Some(cp) = parse_cp(trimmed) {
                    result.cp = Some(cp);
                    result.mate = None;
                }
                if let Some(mate) = parse_mate(trimmed) {
                    result.mate = Some(mate);
                    result.cp = None;
                }
            } else if trimmed.starts_with("bestmove") {
                break;
            }
        }

        Ok(result)
    }

    /// Send quit command and wait for process to exit
    pub async fn quit(&mut self) {
        let _ = self.send("quit").await;
        let _ = self.process.wait().await;
    }
}

impl Drop for StockfishEngine {
    fn drop(&mut self) {
        // Best-effort synchronous kill in drop
        let _ = self.process.start_kill();
    }
}

/// Render a JSON option value the way UCI expects it (bare token, no quotes)
fn option_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse centipawn score from info line
fn parse_cp(line: &str) -> Option<i32> {
    token_after(line, "cp")
}

/// Parse mate score from info line
fn parse_mate(line: &str) -> Option<i32> {
    token_after(line, "mate")
}

/// Parse multipv index from info line
fn parse_multipv_index(line: &str) -> Option<u32> {
    token_after(line, "multipv")
}

/// Slot index for an info line. The multipv field is 1-based on the wire;
/// a missing or nonsense index falls back to the top slot.
fn pv_slot(line: &str) -> usize {
    parse_multipv_index(line).unwrap_or(1).saturating_sub(1) as usize
}

/// Parse searched node count from info line
fn parse_nodes(line: &str) -> Option<i64> {
    token_after(line, "nodes")
}

fn token_after<T: std::str::FromStr>(line: &str, key: &str) -> Option<T> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    for (i, part) in parts.iter().enumerate() {
        if *part == key && i + 1 < parts.len() {
            return parts[i + 1].parse().ok();
        }
    }
    None
}

/// Parse PV moves from info line
fn parse_pv(line: &str) -> Vec<String> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let mut in_pv = false;
    let mut moves = Vec::new();

    for part in parts {
        if part == "pv" {
            in_pv = true;
            continue;
        }
        if in_pv {
            // PV ends at next keyword or end of line
            if part.starts_with("bmc") || part == "string" {
                break;
            }
            moves.push(part.to_string());
        }
    }

    moves
}
