//! Classification of exchange rejections.

/// What a rejection reason means for the step that was sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
	/// The step had already been applied; treated as success.
	AlreadyCompleted(String),
	/// A real refusal, surfaced verbatim.
	Genuine(String),
}

/// Matches rejection reasons against configured "already done" patterns.
#[derive(Debug, Clone)]
pub struct RejectionClassifier {
	patterns: Vec<String>,
}

impl RejectionClassifier {
	/// Patterns are matched case-insensitively as substrings.
	pub fn new(patterns: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
		Self {
			patterns: patterns
				.into_iter()
				.map(|p| p.as_ref().trim().to_lowercase())
				.filter(|p| !p.is_empty())
				.collect(),
		}
	}

	pub fn classify(&self, reason: &str) -> Rejection {
		let lowered = reason.to_lowercase();
		if self.patterns.iter().any(|p| lowered.contains(p)) {
			Rejection::AlreadyCompleted(reason.to_string())
		} else {
			Rejection::Genuine(reason.to_string())
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_patterns_match_case_insensitively() {
		let classifier = RejectionClassifier::new(["already", "Duplicate"]);
		assert_eq!(
			classifier.classify("Genesis ALREADY called"),
			Rejection::AlreadyCompleted("Genesis ALREADY called".to_string())
		);
		assert_eq!(
			classifier.classify("duplicate nonce"),
			Rejection::AlreadyCompleted("duplicate nonce".to_string())
		);
	}

	#[test]
	fn test_other_reasons_are_genuine() {
		let classifier = RejectionClassifier::new(["already"]);
		assert_eq!(
			classifier.classify("Insufficient balance for max gas"),
			Rejection::Genuine("Insufficient balance for max gas".to_string())
		);
	}

	#[test]
	fn test_blank_patterns_are_ignored() {
		let classifier = RejectionClassifier::new(["", "  "]);
		assert!(matches!(classifier.classify("anything"), Rejection::Genuine(_)));
	}
}
