#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(frame) = std::str::from_utf8(data) else {
        return;
    };

    // Event arrays as delivered by any transport.
    let _ = lobby_link::protocol::ServerEvent::decode(frame);
    let _ = lobby_link::protocol::ClientEvent::decode(frame);

    // Raw WebSocket frames, including the Engine.IO and Socket.IO prefixes.
    if let Ok(lobby_link::transports::engine_io::Packet::Message(
        lobby_link::transports::engine_io::SocketPacket::Event(array),
    )) = lobby_link::transports::engine_io::decode(frame)
    {
        let _ = lobby_link::protocol::ServerEvent::decode(&array);
    }
});
