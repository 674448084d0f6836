//! The fixed suite of knight-attack cases every submission is graded
//! against. Not user-editable; case order is significant because the case
//! index identifies outcomes in the report.

/// One fixed input / expected-answer pair.
///
/// Inputs are the board size, the knight's square and the pawn's square.
#[derive(Debug, Clone, Copy)]
pub struct TestCase {
    pub n: i64,
    pub kr: i64,
    pub kc: i64,
    pub pr: i64,
    pub pc: i64,
    /// Expected output, compared as a trimmed string (no numeric coercion)
    pub answer: &'static str,
}

impl TestCase {
    /// The line fed to the submission on stdin.
    pub fn stdin_line(&self) -> String {
        format!("{} {} {} {} {}\n", self.n, self.kr, self.kc, self.pr, self.pc)
    }
}

/// Answer a correct submission prints when the pawn cannot be reached.
pub const NO_SOLUTION: &str = "None";

const CASES: &[TestCase] = &[
    TestCase { n: 8, kr: 1, kc: 1, pr: 2, pc: 2, answer: "2" },
    TestCase { n: 8, kr: 1, kc: 1, pr: 2, pc: 3, answer: "1" },
    TestCase { n: 8, kr: 0, kc: 3, pr: 4, pc: 2, answer: "3" },
    TestCase { n: 8, kr: 0, kc: 3, pr: 5, pc: 2, answer: "4" },
    TestCase { n: 24, kr: 4, kc: 7, pr: 19, pc: 20, answer: "10" },
    TestCase { n: 100, kr: 21, kc: 10, pr: 0, pc: 0, answer: "11" },
    TestCase { n: 3, kr: 0, kc: 0, pr: 1, pc: 2, answer: "1" },
    TestCase { n: 3, kr: 0, kc: 0, pr: 1, pc: 1, answer: NO_SOLUTION },
];

pub fn cases() -> &'static [TestCase] {
    CASES
}

/// Invocation stub appended to every submission. It reads the five
/// whitespace-separated integers from stdin, calls the expected entry
/// function and prints its return value, which fully determines the
/// answer format the comparator sees.
pub const PYTHON_ENTRY_STUB: &str = r#"if __name__ == "__main__":
    import sys
    n, kr, kc, pr, pc = map(int, sys.stdin.read().split())
    print(knight_attack(n, kr, kc, pr, pc))
"#;
