use tracing::debug;
use uuid::Uuid;

use parlor_core::Hub;
use parlor_types::events::ClientCommand;

/// Decode-side command dispatch: every command maps to one hub operation,
/// and a rejected operation answers only the originating client.
pub async fn handle_command(hub: &Hub, conn_id: Uuid, cmd: ClientCommand) {
    hub.touch(conn_id).await;

    let result = match cmd {
        ClientCommand::Join {
            name,
            avatar,
            access_code,
            token,
        } => hub.join(conn_id, &name, avatar, access_code, token).await,
        ClientCommand::Rename { new_name } => hub.rename(conn_id, &new_name).await,
        ClientCommand::SendMessage {
            channel,
            content,
            attachment,
            reply_to,
        } => {
            hub.send_message(conn_id, &channel, &content, attachment, reply_to)
                .await
        }
        ClientCommand::SwitchChannel { channel } => hub.switch_channel(conn_id, &channel).await,
        ClientCommand::TypingStart { channel } => hub.typing_start(conn_id, &channel).await,
        ClientCommand::TypingStop => hub.typing_stop(conn_id).await,
        ClientCommand::React {
            message_id,
            emoji,
            action,
        } => hub.react(conn_id, message_id, &emoji, action).await,
        ClientCommand::EditMessage {
            message_id,
            new_content,
        } => hub.edit_message(conn_id, message_id, &new_content).await,
        ClientCommand::DeleteMessage { message_id, secret } => {
            hub.delete_message(conn_id, message_id, secret.as_deref())
                .await
        }
        ClientCommand::AdminLogin { secret, .. } => hub.admin_login(conn_id, &secret).await,
        ClientCommand::AdminAction { secret, action } => {
            hub.admin_action(conn_id, &secret, action).await
        }
        ClientCommand::CreatePoll {
            question,
            options,
            channel,
        } => hub.create_poll(conn_id, &question, options, &channel).await,
        ClientCommand::VotePoll {
            poll_id,
            option_index,
        } => hub.vote_poll(conn_id, poll_id, option_index).await,
        ClientCommand::SendDm {
            to,
            content,
            attachment,
        } => hub.send_dm(conn_id, &to, content.as_deref(), attachment).await,
        ClientCommand::GetDmHistory { with_name } => hub.dm_history(conn_id, &with_name).await,
        ClientCommand::GameInvite { to, variant } => hub.game_invite(conn_id, &to, variant).await,
        ClientCommand::GameAccept { invite_id } => hub.game_accept(conn_id, invite_id).await,
        ClientCommand::GameDecline { invite_id } => hub.game_decline(conn_id, invite_id).await,
        ClientCommand::GameMove { game_id, position } => {
            hub.game_move(conn_id, game_id, position).await
        }
        ClientCommand::GameQuit { game_id } => hub.game_quit(conn_id, game_id).await,
    };

    if let Err(e) = result {
        debug!(%conn_id, "command rejected: {e}");
        hub.send_to(conn_id, e.to_event()).await;
    }
}
