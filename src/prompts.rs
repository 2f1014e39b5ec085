use crate::types::{CaseCategory, ChatMessage, GenerationRequest};
use rand::Rng;
use rand::seq::SliceRandom;
use std::time::Duration;

const ASSISTANT: &str = "You are a helpful assistant.";
const ANALYST: &str = "You are a helpful expert support case analyst assistant.";
const REQUESTERS: [&str; 2] = ["client (biller)", "end user (payer)"];

pub fn case_body<R: Rng + ?Sized>(rng: &mut R, timeout: Duration) -> GenerationRequest {
    let requester = REQUESTERS.choose(rng).copied().unwrap_or(REQUESTERS[0]);
    let category = CaseCategory::ALL
        .choose(rng)
        .copied()
        .unwrap_or(CaseCategory::Other);
    GenerationRequest::new(vec![
        ChatMessage::system(ASSISTANT),
        ChatMessage::user(format!(
            "Written like a human submitting a support ticket, please generate the body of a \
             support ticket from a {requester} categorized as {category}, but do not include a subject."
        )),
    ])
    .with_max_tokens(250)
    .with_timeout(timeout)
    .with_step("body")
}

pub fn vague_subject(body: &str, timeout: Duration) -> GenerationRequest {
    GenerationRequest::new(vec![
        ChatMessage::system(ASSISTANT),
        ChatMessage::user(format!(
            "Generate a very vague and unhelpful subject based on the following case content, \
             even if it doesn't describe it well: {body}"
        )),
    ])
    .with_timeout(timeout)
    .with_step("subject")
}

pub fn detailed_subject(description: &str, timeout: Duration) -> GenerationRequest {
    GenerationRequest::new(vec![
        ChatMessage::system(ANALYST),
        ChatMessage::user(format!(
            "Please return ONLY a short but highly detailed subject for the following support case: {description}"
        )),
    ])
    .with_max_tokens(50)
    .with_temperature(0.4)
    .with_timeout(timeout)
    .with_step("subject")
}

pub fn category(description: &str, timeout: Duration) -> GenerationRequest {
    let labels = CaseCategory::ALL
        .iter()
        .map(|c| c.label())
        .collect::<Vec<_>>()
        .join(", ");
    GenerationRequest::new(vec![
        ChatMessage::system(ANALYST),
        ChatMessage::user(format!(
            "Please return ONLY the most appropriate category for the following support case. \
             Choose one of these: {labels}\n---\n{description}"
        )),
    ])
    .with_max_tokens(50)
    .with_temperature(0.5)
    .with_timeout(timeout)
    .with_step("category")
}

pub fn priority(description: &str, timeout: Duration) -> GenerationRequest {
    GenerationRequest::new(vec![
        ChatMessage::system(ANALYST),
        ChatMessage::user(format!(
            "Please respond with ONLY the appropriate priority level (Low, Medium, High) for the following support case: {description}"
        )),
    ])
    .with_max_tokens(10)
    .with_temperature(0.4)
    .with_timeout(timeout)
    .with_step("priority")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn body_prompt_names_a_known_category() {
        let mut rng = StdRng::seed_from_u64(7);
        let request = case_body(&mut rng, Duration::from_secs(10));
        assert_eq!(request.max_tokens, 250);
        assert_eq!(request.timeout, Duration::from_secs(10));
        assert_eq!(request.messages[0].role, Role::System);
        let prompt = request.prompt();
        assert!(CaseCategory::ALL
            .iter()
            .any(|c| prompt.contains(&format!("categorized as {c},"))));
        assert!(REQUESTERS.iter().any(|r| prompt.contains(r)));
    }

    #[test]
    fn category_prompt_lists_every_label() {
        let request = category("cannot upload file", Duration::from_secs(5));
        for c in CaseCategory::ALL {
            assert!(request.prompt().contains(c.label()));
        }
        assert!(request.prompt().ends_with("---\ncannot upload file"));
        assert_eq!(request.temperature, 0.5);
    }

    #[test]
    fn retag_prompts_use_low_temperature() {
        let timeout = Duration::from_secs(5);
        assert_eq!(detailed_subject("x", timeout).temperature, 0.4);
        assert_eq!(priority("x", timeout).max_tokens, 10);
    }

    #[test]
    fn each_prompt_names_its_step() {
        let timeout = Duration::from_secs(5);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(case_body(&mut rng, timeout).step, "body");
        assert_eq!(vague_subject("x", timeout).step, "subject");
        assert_eq!(detailed_subject("x", timeout).step, "subject");
        assert_eq!(category("x", timeout).step, "category");
        assert_eq!(priority("x", timeout).step, "priority");
    }
}
