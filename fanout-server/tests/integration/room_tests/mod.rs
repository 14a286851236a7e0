mod test_peer_departure;
mod test_room_manager;
