//! Instruction counting analysis (`instcount`)

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{FunctionPass, PassKind};
use crate::ir::Function;

/// Instruction count of one function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionCount {
    pub function: String,
    pub total: usize,
    /// Count per opcode mnemonic (`icmp` covers every predicate)
    pub by_opcode: BTreeMap<&'static str, usize>,
}

impl fmt::Display for InstructionCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Function {} has {} instructions", self.function, self.total)
    }
}

/// Destination for instruction-count reports
pub trait MetricSink: Send + Sync {
    fn record(&self, report: InstructionCount);
}

/// Writes each report to the `log` facade at info level
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl MetricSink for LogSink {
    fn record(&self, report: InstructionCount) {
        log::info!("{}", report);
        for (opcode, n) in &report.by_opcode {
            log::debug!("  {:<8} {}", opcode, n);
        }
    }
}

/// Keeps every report in memory, in arrival order
#[derive(Debug, Default)]
pub struct CollectingSink {
    reports: Mutex<Vec<InstructionCount>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the reports recorded so far
    pub fn reports(&self) -> Vec<InstructionCount> {
        self.reports.lock().clone()
    }

    /// Remove and return every recorded report
    pub fn take(&self) -> Vec<InstructionCount> {
        std::mem::take(&mut *self.reports.lock())
    }
}

impl MetricSink for CollectingSink {
    fn record(&self, report: InstructionCount) {
        self.reports.lock().push(report);
    }
}

/// Counts every instruction of a function and reports it to a sink.
///
/// Never modifies the function.
pub struct InstructionCounter {
    sink: Arc<dyn MetricSink>,
}

impl InstructionCounter {
    /// Counter reporting to `sink`
    pub fn new(sink: Arc<dyn MetricSink>) -> Self {
        InstructionCounter { sink }
    }

    /// Count without reporting
    pub fn count(func: &Function) -> InstructionCount {
        let mut total = 0;
        let mut by_opcode = BTreeMap::new();
        for id in func.instructions() {
            total += 1;
            *by_opcode.entry(func.inst(id).opcode().mnemonic()).or_insert(0) += 1;
        }
        InstructionCount {
            function: func.name.clone(),
            total,
            by_opcode,
        }
    }
}

impl Default for InstructionCounter {
    fn default() -> Self {
        Self::new(Arc::new(LogSink))
    }
}

impl FunctionPass for InstructionCounter {
    fn name(&self) -> &str {
        "instcount"
    }

    fn description(&self) -> &'static str {
        "Count the instructions of each function"
    }

    fn kind(&self) -> PassKind {
        PassKind::Analysis
    }

    fn run(&self, func: &mut Function) -> bool {
        self.sink.record(Self::count(func));
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{parse_module, IrBuilder, Param, Type};

    #[test]
    fn test_count_simple_add() {
        let mut func = Function::new(
            "simple_add",
            vec![
                Param { name: "a".into(), ty: Type::I32 },
                Param { name: "b".into(), ty: Type::I32 },
            ],
            Type::I32,
        );
        {
            let mut b = IrBuilder::new(&mut func);
            let (a0, a1) = (b.arg(0), b.arg(1));
            let sum = b.add(Type::I32, a0, a1);
            b.ret(Some(sum));
        }

        let sink = Arc::new(CollectingSink::new());
        let counter = InstructionCounter::new(sink.clone());
        let before = func.to_string();

        assert!(!counter.run(&mut func));
        assert_eq!(func.to_string(), before);

        let reports = sink.take();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].total, 2);
        assert_eq!(reports[0].by_opcode.get("add"), Some(&1));
        assert_eq!(reports[0].by_opcode.get("ret"), Some(&1));
        assert_eq!(reports[0].to_string(), "Function simple_add has 2 instructions");
        assert!(sink.reports().is_empty());
    }

    #[test]
    fn test_count_matches_enumeration() {
        let source = r#"
define i64 @f(i64 %x, i64 %y) {
entry:
  %c = icmp slt i64 %x, %y
  br i1 %c, label %lt, label %ge
lt:
  %d = sub i64 %y, %x
  ret i64 %d
ge:
  %e = sub i64 %x, %y
  %g = icmp eq i64 %e, 0
  %h = select i1 %g, i64 1, i64 %e
  ret i64 %h
}
"#;
        let module = parse_module("m", source).unwrap();
        let func = &module.functions()[0];
        let enumerated: usize = func.blocks().iter().map(|b| b.insts().len()).sum();

        let report = InstructionCounter::count(func);
        assert_eq!(report.total, enumerated);
        assert_eq!(report.total, 8);
        assert_eq!(report.by_opcode.get("icmp"), Some(&2));
        assert_eq!(report.by_opcode.values().sum::<usize>(), report.total);
    }

    #[test]
    fn test_empty_function() {
        let func = Function::new("decl", vec![], Type::Void);
        let report = InstructionCounter::count(&func);
        assert_eq!(report.total, 0);
        assert!(report.by_opcode.is_empty());
    }
}
