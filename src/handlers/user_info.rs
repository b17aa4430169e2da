use super::{order_context, Handler, TurnContext, OUTPUT_RULES};
use crate::state_machine::output::CompletionFlags;
use crate::state_machine::{HandlerId, OutputContract};

/// Collects the customer details the order type requires
pub struct UserInfoHandler;

impl UserInfoHandler {
    pub fn placing_order_reply(name: &str) -> String {
        format!("Alright, {name}! Give me one second as I place the order.")
    }
}

impl Handler for UserInfoHandler {
    fn id(&self) -> HandlerId {
        HandlerId::UserInfo
    }

    fn instructions(&self, ctx: &TurnContext<'_>) -> String {
        let info = &ctx.state.customer_info;
        let known = |value: &Option<String>| value.clone().unwrap_or_else(|| "(unknown)".to_string());
        let missing = info.missing_fields(ctx.state.order_type).join(", ");
        format!(
            "You collect the customer's details for a confirmed order.\n\
Still needed: {missing}\n\
Known: name={name}, contact={contact}, delivery_address={address}, pickup_time={pickup}\n\
- Put every detail the customer gives in order_update.customer_info.\n\
- Once nothing is still needed, set info_complete to true and respond \
\"Alright, <their name>! Give me one second as I place the order.\"\n\
- Otherwise ask for the next missing detail.\n\
- If the customer wants to change their items, set requires_order_update to true and ask \
what they would like to change.\n\n\
{order}\n{rules}\n\
# EXAMPLES\n\
ASSISTANT: Can I have a name for this order, please?\n\
CUSTOMER: john\n\
OUTPUT: {{\"agent_response\": \"Alright, john! Give me one second as I place the order.\", \
\"order_update\": {{\"customer_info\": {{\"name\": \"john\"}}}}, \"info_complete\": true}}\n\
ASSISTANT: Can I have a name for this order, please?\n\
CUSTOMER: Oh, actually, can I remove the fries?\n\
OUTPUT: {{\"agent_response\": \"Sure, let's update your order.\", \
\"requires_order_update\": true}}\n",
            name = known(&info.name),
            contact = known(&info.contact),
            address = known(&info.delivery_address),
            pickup = known(&info.pickup_time),
            order = order_context(ctx.state),
            rules = OUTPUT_RULES,
        )
    }

    fn preflight(&self, ctx: &TurnContext<'_>) -> Option<OutputContract> {
        let info = &ctx.state.customer_info;
        if !info.is_complete_for(ctx.state.order_type) {
            return None;
        }
        let name = info.name.as_deref()?;
        Some(
            OutputContract::reply(HandlerId::UserInfo, Self::placing_order_reply(name)).with_flags(
                CompletionFlags {
                    info_complete: true,
                    ..CompletionFlags::default()
                },
            ),
        )
    }
}
