//! Prompt builders, one per stage.

use crate::context::AssembledContext;
use crate::pipeline::request::{DraftRequest, FirmProfile};
use crate::context::token;
use casedraft_core::message::Message;
use tracing::warn;

const FACT_EXTRACTION_SYSTEM: &str = "\
You extract facts for an engagement document. Read the case material and \
produce a plain fact sheet: parties, key dates, amounts, reference numbers, \
issues identified and anything the client must supply. Use short bullet \
points. Do not draft the document itself and do not invent facts.";

const STRUCTURING_SYSTEM: &str = "\
You turn a fact sheet into a structured engagement document draft. Organise \
it into sections, each introduced by a bold marker on its own line, for \
example **Scope of Work**, **Client Responsibilities**, **Fees**, \
**Timeline** and **Terms**. State the billing rate in the Fees section. \
Keep every fact from the fact sheet.";

const TONE_FINISHING_SYSTEM: &str = "\
You finish an engagement document draft. Rewrite the prose so the whole \
document reads in one consistent, professional voice and is signed by the \
preparer. Every bold marker (text between ** and **) and every heading line \
starting with # must appear in your output exactly as in the draft. Do not \
add, remove, rename or reorder sections.";

const SINGLE_PASS_SYSTEM: &str = "\
You draft an engagement document in one pass from case material. Organise it \
into sections introduced by bold markers such as **Scope of Work** and \
**Fees**, state the billing rate, keep to facts stated in the material and \
sign as the preparer.";

/// Cap on each request metadata field pasted into a prompt.
pub const METADATA_FIELD_TOKENS: usize = 64;

pub fn fact_extraction(context: &AssembledContext, request: &DraftRequest) -> Vec<Message> {
    let header = format!(
        "Case reference: {}\nDepartment: {}\n\n",
        field(&request.case_reference),
        department(request)
    );
    exchange(
        FACT_EXTRACTION_SYSTEM,
        header,
        &context.body,
        context.prompt_capacity,
    )
}

pub fn structuring(fact_sheet: &str, firm: &FirmProfile, capacity: usize) -> Vec<Message> {
    let header = format!("{}\n\nFact sheet:\n", firm_block(firm));
    exchange(STRUCTURING_SYSTEM, header, fact_sheet, capacity)
}

pub fn tone_finishing(draft: &str, firm: &FirmProfile, capacity: usize) -> Vec<Message> {
    let header = format!(
        "Sign as: {}\nPractice: {}\n\nDraft:\n",
        field(&firm.signature()),
        field(&firm.practice_name)
    );
    exchange(TONE_FINISHING_SYSTEM, header, draft, capacity)
}

pub fn single_pass(context: &AssembledContext, request: &DraftRequest) -> Vec<Message> {
    let header = format!(
        "Case reference: {}\nDepartment: {}\n{}\n\n",
        field(&request.case_reference),
        department(request),
        firm_block(&request.firm)
    );
    exchange(
        SINGLE_PASS_SYSTEM,
        header,
        &context.body,
        context.prompt_capacity,
    )
}

/// System message plus one user message of `header` then `body`.
///
/// `body` is cut so the estimates of both messages together stay within
/// `capacity`. A capacity below the wrapper itself leaves an empty body.
fn exchange(system: &str, header: String, body: &str, capacity: usize) -> Vec<Message> {
    let overhead = token::estimate_tokens(system) + token::estimate_tokens(&header);
    let body_cap = capacity.saturating_sub(overhead);
    if token::estimate_tokens(body) > body_cap {
        warn!(
            overhead,
            body_cap, capacity, "Stage input over prompt capacity, truncating"
        );
    }
    let body = token::truncate(body, body_cap);
    vec![
        Message::system(system),
        Message::user(format!("{header}{body}")),
    ]
}

fn field(text: &str) -> String {
    token::truncate(text.trim(), METADATA_FIELD_TOKENS).into_owned()
}

fn department(request: &DraftRequest) -> String {
    if request.department.trim().is_empty() {
        "general".to_string()
    } else {
        field(&request.department)
    }
}

fn firm_block(firm: &FirmProfile) -> String {
    let rate = if firm.billing_rate.trim().is_empty() {
        "not specified".to_string()
    } else {
        field(&firm.billing_rate)
    };
    format!(
        "Practice: {}\nBilling rate: {}\nPreparer: {}",
        field(&firm.practice_name),
        rate,
        field(&firm.signature())
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::token::TRUNCATION_MARKER;
    use crate::context::{AssemblyLimits, ContextAssembler, Evidence, TokenBudget};
    use casedraft_core::message::Role;

    fn request() -> DraftRequest {
        DraftRequest {
            case_reference: "2024-117".into(),
            department: "individual tax".into(),
            firm: FirmProfile {
                practice_name: "Acme Tax".into(),
                billing_rate: "$250/hour".into(),
                preparer_name: "Jordan Lee".into(),
                preparer_title: "CPA".into(),
            },
            staged: None,
        }
    }

    fn context(body: &str) -> AssembledContext {
        AssembledContext {
            sections: Vec::new(),
            body: body.into(),
            estimated_tokens: 0,
            budget_total: 150_000,
            prompt_capacity: 140_000,
            backstop_applied: false,
        }
    }

    #[test]
    fn fact_extraction_carries_case_and_context() {
        let msgs = fact_extraction(&context("EVIDENCE"), &request());
        assert_eq!(msgs[0].role, Role::System);
        assert!(msgs[1].content.starts_with("Case reference: 2024-117\nDepartment: individual tax"));
        assert!(msgs[1].content.ends_with("EVIDENCE"));
    }

    #[test]
    fn structuring_carries_firm_identity() {
        let msgs = structuring("- fact", &request().firm, 140_000);
        assert!(msgs[1].content.contains("Billing rate: $250/hour"));
        assert!(msgs[1].content.contains("Preparer: Jordan Lee, CPA"));
        assert!(msgs[1].content.ends_with("- fact"));
    }

    #[test]
    fn tone_finishing_demands_markers_verbatim() {
        let msgs = tone_finishing("**Fees**", &request().firm, 140_000);
        assert!(msgs[0].content.contains("exactly as in the draft"));
        assert!(msgs[1].content.starts_with("Sign as: Jordan Lee, CPA"));
    }

    #[test]
    fn blank_department_and_rate_have_fallbacks() {
        let mut req = request();
        req.department.clear();
        req.firm.billing_rate.clear();
        let msgs = single_pass(&context("x"), &req);
        assert!(msgs[1].content.contains("Department: general"));
        assert!(msgs[1].content.contains("Billing rate: not specified"));
    }

    fn prompt_tokens(messages: &[Message]) -> usize {
        messages
            .iter()
            .map(|m| token::estimate_tokens(&m.content))
            .sum()
    }

    #[test]
    fn oversized_case_reference_stays_inside_prompt_capacity() {
        let assembled = ContextAssembler::new(TokenBudget::default(), AssemblyLimits::default())
            .assemble(&Evidence::default());
        let mut req = request();
        req.case_reference = "R".repeat(1_000_000);
        req.department = "D".repeat(50_000);

        for msgs in [
            fact_extraction(&assembled, &req),
            single_pass(&assembled, &req),
        ] {
            let used = prompt_tokens(&msgs);
            assert!(used <= assembled.prompt_capacity, "used={used}");
            assert!(used < 1_000, "used={used}");
            assert!(msgs[1].content.contains(TRUNCATION_MARKER));
        }
    }

    #[test]
    fn oversized_firm_fields_are_capped_in_every_stage() {
        let mut firm = request().firm;
        firm.practice_name = "P".repeat(200_000);
        firm.billing_rate = "$".repeat(200_000);
        firm.preparer_name = "N".repeat(200_000);

        for msgs in [
            structuring("- fact", &firm, 140_000),
            tone_finishing("**Fees**", &firm, 140_000),
        ] {
            assert!(prompt_tokens(&msgs) < 1_000);
        }
    }

    #[test]
    fn full_body_plus_wrapper_is_cut_to_capacity() {
        // Body alone already fills the capacity.
        let mut ctx = context(&"e".repeat(8_000));
        ctx.prompt_capacity = 2_000;
        let mut req = request();
        req.case_reference = "C".repeat(10_000);

        for msgs in [fact_extraction(&ctx, &req), single_pass(&ctx, &req)] {
            assert!(prompt_tokens(&msgs) <= 2_000);
            assert!(msgs[1].content.ends_with(TRUNCATION_MARKER));
        }
    }

    #[test]
    fn body_within_capacity_is_untouched() {
        let msgs = structuring("- fact", &request().firm, 140_000);
        assert!(!msgs[1].content.contains(TRUNCATION_MARKER));
        assert!(msgs[1].content.ends_with("\n\nFact sheet:\n- fact"));
    }
}
