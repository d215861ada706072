use serde::Serialize;

use crate::tokenize::tokenize;

/// One step of the reference-to-hypothesis alignment, in reading order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum AlignmentOp {
    Match { token: String },
    Substitution { reference: String, hypothesis: String },
    Deletion { reference: String },
    Insertion { hypothesis: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WerResult {
    pub wer: f64,
    pub substitutions: usize,
    pub deletions: usize,
    pub insertions: usize,
    pub total_reference_tokens: usize,
    pub correct_tokens: usize,
    pub hypothesis_tokens: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub operations: Vec<AlignmentOp>,
}

impl WerResult {
    pub fn errors(&self) -> usize {
        self.substitutions + self.deletions + self.insertions
    }

    pub fn percent(&self) -> f64 {
        self.wer * 100.0
    }

    /// Drops the per-token alignment, keeping only the counts.
    pub fn without_operations(mut self) -> Self {
        self.operations = Vec::new();
        self
    }
}

/// Tokenizes both texts and aligns them.
pub fn align(reference: &str, hypothesis: &str) -> WerResult {
    align_tokens(&tokenize(reference), &tokenize(hypothesis))
}

pub fn align_tokens(reference: &[String], hypothesis: &[String]) -> WerResult {
    let dp = distance_table(reference, hypothesis);
    let operations = backtrack(&dp, reference, hypothesis);

    let mut substitutions = 0;
    let mut deletions = 0;
    let mut insertions = 0;
    for op in &operations {
        match op {
            AlignmentOp::Match { .. } => {}
            AlignmentOp::Substitution { .. } => substitutions += 1,
            AlignmentOp::Deletion { .. } => deletions += 1,
            AlignmentOp::Insertion { .. } => insertions += 1,
        }
    }

    let total = reference.len();
    let wer = if total == 0 {
        if hypothesis.is_empty() { 0.0 } else { 1.0 }
    } else {
        (substitutions + deletions + insertions) as f64 / total as f64
    };

    WerResult {
        wer,
        substitutions,
        deletions,
        insertions,
        total_reference_tokens: total,
        correct_tokens: total - substitutions - deletions,
        hypothesis_tokens: hypothesis.len(),
        operations,
    }
}

/// `dp[i][j]`: edits turning the first `i` reference tokens into the first
/// `j` hypothesis tokens.
fn distance_table(reference: &[String], hypothesis: &[String]) -> Vec<Vec<usize>> {
    let (m, n) = (reference.len(), hypothesis.len());
    let mut dp = vec![vec![0usize; n + 1]; m + 1];
    for (i, row) in dp.iter_mut().enumerate() {
        row[0] = i;
    }
    for (j, cell) in dp[0].iter_mut().enumerate() {
        *cell = j;
    }

    for i in 1..=m {
        for j in 1..=n {
            dp[i][j] = if reference[i - 1] == hypothesis[j - 1] {
                dp[i - 1][j - 1]
            } else {
                1 + dp[i - 1][j].min(dp[i][j - 1]).min(dp[i - 1][j - 1])
            };
        }
    }
    dp
}

/// Walks back from `dp[m][n]`, preferring diagonal, then vertical, then
/// horizontal moves whenever several predecessors are minimal.
fn backtrack(dp: &[Vec<usize>], reference: &[String], hypothesis: &[String]) -> Vec<AlignmentOp> {
    let mut ops = Vec::with_capacity(reference.len().max(hypothesis.len()));
    let (mut i, mut j) = (reference.len(), hypothesis.len());

    while i > 0 || j > 0 {
        if i > 0 && j > 0 {
            let same = reference[i - 1] == hypothesis[j - 1];
            let cost = usize::from(!same);
            if dp[i][j] == dp[i - 1][j - 1] + cost {
                ops.push(if same {
                    AlignmentOp::Match {
                        token: reference[i - 1].clone(),
                    }
                } else {
                    AlignmentOp::Substitution {
                        reference: reference[i - 1].clone(),
                        hypothesis: hypothesis[j - 1].clone(),
                    }
                });
                i -= 1;
                j -= 1;
                continue;
            }
        }
        if i > 0 && dp[i][j] == dp[i - 1][j] + 1 {
            ops.push(AlignmentOp::Deletion {
                reference: reference[i - 1].clone(),
            });
            i -= 1;
        } else {
            ops.push(AlignmentOp::Insertion {
                hypothesis: hypothesis[j - 1].clone(),
            });
            j -= 1;
        }
    }

    ops.reverse();
    ops
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(words: &[&str]) -> Vec<String> {
        words.iter().map(|word| word.to_string()).collect()
    }

    #[test]
    fn identical_texts_have_zero_wer() {
        for text in ["the quick brown fox", "今天天气很好", "mixed 文本 here", ""] {
            let result = align(text, text);
            assert_eq!(result.wer, 0.0, "{text}");
            assert_eq!(result.correct_tokens, result.total_reference_tokens);
        }
    }

    #[test]
    fn empty_reference_special_cases() {
        assert_eq!(align("", "").wer, 0.0);
        let result = align("", "something here");
        assert_eq!(result.wer, 1.0);
        assert_eq!(result.insertions, 2);
        assert_eq!(result.total_reference_tokens, 0);
        assert_eq!(result.correct_tokens, 0);
    }

    #[test]
    fn single_word_substitution() {
        let result = align("the cat sat", "the dog sat");
        assert_eq!(result.substitutions, 1);
        assert_eq!(result.deletions, 0);
        assert_eq!(result.insertions, 0);
        assert_eq!(result.total_reference_tokens, 3);
        assert_eq!(result.correct_tokens, 2);
        assert!((result.wer - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(
            result.operations[1],
            AlignmentOp::Substitution {
                reference: "cat".into(),
                hypothesis: "dog".into()
            }
        );
    }

    #[test]
    fn cjk_character_substitutions() {
        let result = align("今天天气很好", "今天天气不错");
        assert_eq!(result.total_reference_tokens, 6);
        assert_eq!(result.substitutions, 2);
        assert_eq!(result.deletions, 0);
        assert_eq!(result.insertions, 0);
        assert!((result.wer - 2.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn deletions_and_insertions_are_classified() {
        let result = align("a b c d", "a c d e");
        assert_eq!(result.deletions, 1);
        assert_eq!(result.insertions, 1);
        assert_eq!(result.substitutions, 0);
        assert_eq!(result.errors(), 2);
        assert!((result.percent() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn ties_prefer_substitution_over_deletion_and_insertion() {
        // "a b" -> "c": one substitution plus one deletion either way round;
        // the diagonal-first walk substitutes the last token.
        let result = align_tokens(&tokens(&["a", "b"]), &tokens(&["c"]));
        assert_eq!(
            result.operations,
            vec![
                AlignmentOp::Deletion {
                    reference: "a".into()
                },
                AlignmentOp::Substitution {
                    reference: "b".into(),
                    hypothesis: "c".into()
                },
            ]
        );

        let result = align_tokens(&tokens(&["x"]), &tokens(&["y", "z"]));
        assert_eq!(
            result.operations,
            vec![
                AlignmentOp::Insertion {
                    hypothesis: "y".into()
                },
                AlignmentOp::Substitution {
                    reference: "x".into(),
                    hypothesis: "z".into()
                },
            ]
        );
    }

    #[test]
    fn repeated_alignment_is_identical() {
        let first = align("one two three four", "one too three for five");
        let second = align("one two three four", "one too three for five");
        assert_eq!(first, second);
    }

    #[test]
    fn serializes_counts_without_empty_operations() {
        let result = align("a b", "a c").without_operations();
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["substitutions"], 1);
        assert_eq!(value["total_reference_tokens"], 2);
        assert!(value.get("operations").is_none());
    }
}
