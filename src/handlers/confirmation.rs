use super::{order_context, Handler, TurnContext, OUTPUT_RULES};
use crate::state_machine::state::CustomerInfo;
use crate::state_machine::HandlerId;

/// Reads the order back and records the customer's yes or no
pub struct ConfirmationHandler;

impl Handler for ConfirmationHandler {
    fn id(&self) -> HandlerId {
        HandlerId::Confirmation
    }

    fn instructions(&self, ctx: &TurnContext<'_>) -> String {
        let details = CustomerInfo::default()
            .missing_fields(ctx.state.order_type)
            .join(", ");
        format!(
            "You confirm the customer's order before it is placed. The order has been read back \
to the customer.\n\
- If the customer confirms, set order_confirmed to true and ask for these details: {details}.\n\
- If the customer wants to change something, set order_confirmed to false and ask what they \
would like to change.\n\
- If the customer hasn't answered yet, leave order_confirmed null, summarise the items and \
the total, and ask whether the order is correct.\n\n\
{order}\n{rules}\n\
# EXAMPLES\n\
CUSTOMER: yes that's right\n\
OUTPUT: {{\"agent_response\": \"Great! Can I have a name for this order, please?\", \
\"order_confirmed\": true}}\n\
CUSTOMER: actually no\n\
OUTPUT: {{\"agent_response\": \"No problem, what would you like to change?\", \
\"order_confirmed\": false}}\n",
            order = order_context(ctx.state),
            rules = OUTPUT_RULES,
        )
    }
}
