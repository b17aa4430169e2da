use super::{order_context, Handler, TurnContext, OUTPUT_RULES};
use crate::state_machine::HandlerId;

/// Asks whether the order is dine in, takeout or delivery
pub struct PreorderHandler;

impl Handler for PreorderHandler {
    fn id(&self) -> HandlerId {
        HandlerId::Preorder
    }

    fn instructions(&self, ctx: &TurnContext<'_>) -> String {
        format!(
            "You greet customers of {restaurant} and find out whether the order is for dine in, \
takeout or delivery.\n\
- If the customer answers, set order_update.order_type to dine_in, takeout or delivery and \
acknowledge it, then ask what they would like to order.\n\
- If they order food before answering, tell them you'll take that in a moment and ask the \
dine in / takeout / delivery question.\n\
- Otherwise politely ask the question again and leave order_type as unknown.\n\n\
{order}\n{rules}\n\
# EXAMPLE\n\
CUSTOMER: I'd like takeout\n\
OUTPUT: {{\"agent_response\": \"Great, takeout it is! What would you like to order?\", \
\"order_update\": {{\"order_type\": \"takeout\"}}}}\n",
            restaurant = ctx.menu.name,
            order = order_context(ctx.state),
            rules = OUTPUT_RULES,
        )
    }
}
